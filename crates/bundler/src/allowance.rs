//! How the adapter gets hold of the user's tokens.
//!
//! Every pull resolves, in order, to: a native value transfer, an existing
//! adapter allowance (direct or through Permit2), an EIP-2612 permit, a plain
//! approval, or a Permit2 grant.

use alloy_primitives::{Address, U256};
use morpho_rs_sim::{
    Amount, Operation, OperationKind, SimulationState, MAX_UINT_48, NATIVE_ADDRESS,
};

use crate::options::BundlerOptions;

/// EIP-712 `(name, version)` of `token`'s EIP-2612 domain, if it has one.
///
/// Vault shares without explicit metadata sign under their token name and
/// version `"1"`.
pub(crate) fn permit_domain(state: &SimulationState, token: Address) -> Option<(String, String)> {
    let metadata = state.token(token).ok();
    if let Some(domain) = metadata.and_then(|metadata| metadata.permit.as_ref()) {
        return Some((domain.name.clone(), domain.version.clone()));
    }
    if state.is_vault(token) {
        let metadata = metadata?;
        let name = metadata.name.clone().unwrap_or_else(|| metadata.symbol.clone());
        return Some((name, "1".to_string()));
    }
    None
}

/// Operations leaving the adapter allowed to spend `amount` of `user`'s `token`.
pub(crate) fn adapter_grant(
    state: &SimulationState,
    options: &BundlerOptions,
    user: Address,
    token: Address,
    amount: U256,
) -> Vec<Operation> {
    let adapter = state.addresses.general_adapter1;
    let holding = state.holding_or_empty(user, token);
    if holding.allowances.general_adapter1 >= amount {
        return Vec::new();
    }

    let kind = if options.supports_signature && permit_domain(state, token).is_some() {
        OperationKind::Erc20Permit {
            token,
            spender: adapter,
            amount,
            nonce: holding.erc2612_nonce.unwrap_or_default(),
        }
    } else {
        OperationKind::Erc20Approve {
            token,
            spender: adapter,
            amount,
        }
    };
    vec![Operation::new(user, kind)]
}

/// Operations moving `amount` of `user`'s `token` to `receiver` through the adapter.
pub(crate) fn input_transfer(
    state: &SimulationState,
    options: &BundlerOptions,
    user: Address,
    token: Address,
    amount: U256,
    receiver: Address,
) -> Vec<Operation> {
    if amount.is_zero() {
        return Vec::new();
    }

    let adapter = state.addresses.general_adapter1;
    if token == NATIVE_ADDRESS {
        return vec![Operation::new(
            user,
            OperationKind::Erc20Transfer {
                token,
                from: user,
                to: receiver,
                amount: Amount::Exact(amount),
            },
        )];
    }

    let transfer_from = Operation::new(
        adapter,
        OperationKind::Erc20Transfer {
            token,
            from: user,
            to: receiver,
            amount: Amount::Exact(amount),
        },
    );
    let transfer2 = Operation::new(
        adapter,
        OperationKind::Erc20Transfer2 {
            token,
            from: user,
            to: receiver,
            amount: Amount::Exact(amount),
        },
    );

    let holding = state.holding_or_empty(user, token);
    if holding.allowances.general_adapter1 >= amount {
        return vec![transfer_from];
    }

    let Some(permit2) = state.addresses.permit2 else {
        let mut operations = adapter_grant(state, options, user, token, amount);
        operations.push(transfer_from);
        return operations;
    };

    let record = &holding.permit2_allowance;
    let needs_approval = holding.allowances.permit2 < amount;
    let needs_signature = record.amount < amount || record.expiration < state.timestamp();
    if !needs_approval && !needs_signature {
        return vec![transfer2];
    }

    if !options.supports_signature || permit_domain(state, token).is_some() {
        let mut operations = adapter_grant(state, options, user, token, amount);
        operations.push(transfer_from);
        return operations;
    }

    let mut operations = Vec::with_capacity(3);
    if needs_approval {
        operations.push(Operation::new(
            user,
            OperationKind::Erc20Approve {
                token,
                spender: permit2,
                amount: U256::MAX,
            },
        ));
    }
    if needs_signature {
        operations.push(Operation::new(
            user,
            OperationKind::Erc20Permit2 {
                token,
                amount,
                expiration: MAX_UINT_48,
                nonce: record.nonce,
            },
        ));
    }
    operations.push(transfer2);
    operations
}
