//! Plans a Bundler3 bundle from user-level operations.

use alloy::signers::Signer;
use alloy_primitives::U256;
use morpho_rs_sim::{AppliedOperation, Operation, SimulationState};
use tracing::info;

use crate::bundle::ActionBundle;
use crate::encode::encode;
use crate::error::BundlerError;
use crate::finalize::finalize;
use crate::options::BundlerOptions;
use crate::populate::populate;
use crate::requirements::Requirements;

/// A planned bundle with the operations it runs and the state it leads to.
#[derive(Debug, Clone)]
pub struct PlannedBundle {
    pub final_state: SimulationState,
    /// Finalized operations, simulated from the start state
    pub operations: Vec<Operation>,
    pub steps: Vec<AppliedOperation>,
    pub bundle: ActionBundle,
}

/// Plans the bundle running `inputs` from `state`.
///
/// Every input must be sent by the same user. The planner pulls the tokens the
/// adapter needs, authorizes it on Morpho, reallocates liquidity through the
/// public allocator, and hands every leftover back to the user.
///
/// # Example
///
/// ```rust,ignore
/// let planned = plan(&[supply], &state, &BundlerOptions::new())?;
/// for requirement in &planned.bundle.requirements.txs {
///     send(&requirement.raw_call).await?;
/// }
/// ```
pub fn plan(
    inputs: &[Operation],
    state: &SimulationState,
    options: &BundlerOptions,
) -> Result<PlannedBundle, BundlerError> {
    let Some(first) = inputs.first() else {
        return Ok(PlannedBundle {
            final_state: state.clone(),
            operations: Vec::new(),
            steps: Vec::new(),
            bundle: ActionBundle {
                chain_id: state.chain_id,
                addresses: state.addresses.clone(),
                actions: Vec::new(),
                requirements: Requirements::default(),
                value: U256::ZERO,
            },
        });
    };
    let user = first.sender;

    let populated = populate(inputs, state, options)?;
    let trace = finalize(state, options, user, &populated)?;
    let bundle = encode(&trace, options, user)?;

    info!(
        %user,
        inputs = inputs.len(),
        operations = trace.steps.len(),
        actions = bundle.actions.len(),
        signatures = bundle.requirements.signatures.len(),
        txs = bundle.requirements.txs.len(),
        value = %bundle.value,
        "planned bundle"
    );

    Ok(PlannedBundle {
        operations: trace
            .steps
            .iter()
            .map(|step| step.operation.clone())
            .collect(),
        final_state: trace.final_state,
        steps: trace.steps,
        bundle,
    })
}

/// [`plan`], then signs every signature requirement with `signer`.
pub async fn plan_and_sign<S>(
    inputs: &[Operation],
    state: &SimulationState,
    options: &BundlerOptions,
    signer: &S,
) -> Result<PlannedBundle, BundlerError>
where
    S: Signer + ?Sized,
{
    let mut planned = plan(inputs, state, options)?;
    planned.bundle.sign(signer).await?;
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::BundlerAction;
    use crate::requirements::{TransactionKind, TypedMessage};
    use crate::test_fixtures::{self, adapter, ether, market_id, usdc, USDC, USER, VAULT, WETH};
    use alloy::signers::local::PrivateKeySigner;
    use alloy_primitives::Address;
    use morpho_rs_contracts::bundler3::IBundler3;
    use morpho_rs_sim::{
        Amount, AssetsOrShares, Holding, Market, MarketParams, OperationKind, SimError, Token,
        WrapLaw, Wrapper,
    };

    // Anvil's default account 0 private key
    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn supply(user: Address, amount: U256) -> Operation {
        Operation::new(
            user,
            OperationKind::BlueSupply {
                id: market_id(),
                amount: AssetsOrShares::assets(amount),
                on_behalf: user,
                slippage: None,
            },
        )
    }

    fn borrow(amount: U256) -> Operation {
        Operation::new(
            USER,
            OperationKind::BlueBorrow {
                id: market_id(),
                amount: AssetsOrShares::assets(amount),
                on_behalf: USER,
                receiver: USER,
                slippage: None,
            },
        )
    }

    fn action_names(bundle: &ActionBundle) -> Vec<&'static str> {
        bundle.actions.iter().map(BundlerAction::name).collect()
    }

    #[test]
    fn test_empty_plan() {
        let state = test_fixtures::state();
        let planned = plan(&[], &state, &BundlerOptions::new()).unwrap();

        assert!(planned.operations.is_empty());
        assert!(planned.bundle.actions.is_empty());
        assert!(planned.bundle.requirements.is_empty());
        assert_eq!(planned.final_state, state);
    }

    #[test]
    fn test_permit_token_needs_one_signature() {
        let state = test_fixtures::state();
        let planned = plan(&[supply(USER, usdc(1_000))], &state, &BundlerOptions::new()).unwrap();

        let requirements = &planned.bundle.requirements;
        assert_eq!(requirements.signatures.len(), 1);
        assert!(requirements.txs.is_empty());
        assert_eq!(
            action_names(&planned.bundle),
            ["permit", "erc20TransferFrom", "morphoSupply", "erc20Transfer"]
        );
        assert_eq!(planned.bundle.value, U256::ZERO);
        assert_eq!(planned.final_state.balance_of(USER, USDC), usdc(9_000));
        assert_eq!(planned.final_state.balance_of(adapter(), USDC), U256::ZERO);
    }

    #[test]
    fn test_permit2_token_needs_approval_and_signature() {
        let state = test_fixtures::state();
        let collateral = Operation::new(
            USER,
            OperationKind::BlueSupplyCollateral {
                id: market_id(),
                assets: Amount::exact(ether(1)),
                on_behalf: USER,
            },
        );
        let planned = plan(&[collateral], &state, &BundlerOptions::new()).unwrap();

        let requirements = &planned.bundle.requirements;
        assert_eq!(requirements.txs.len(), 1);
        let TransactionKind::Erc20Approve { token, spender, .. } = requirements.txs[0].kind else {
            panic!("expected an approval");
        };
        assert_eq!(token, WETH);
        assert_eq!(Some(spender), state.addresses.permit2);

        assert_eq!(requirements.signatures.len(), 1);
        assert!(matches!(
            requirements.signatures[0].message,
            TypedMessage::PermitSingle(_)
        ));
        assert_eq!(
            action_names(&planned.bundle),
            [
                "approvePermit2",
                "permit2TransferFrom",
                "morphoSupplyCollateral",
                "erc20Transfer"
            ]
        );
    }

    #[test]
    fn test_wrap_flow_skims_both_tokens() {
        let steth = Address::repeat_byte(0x5e);
        let wsteth = Address::repeat_byte(0x7e);
        let params = MarketParams::new(
            USDC,
            wsteth,
            Address::repeat_byte(0x0b),
            test_fixtures::addresses().adaptive_curve_irm.unwrap(),
            U256::from(860_000_000_000_000_000u64),
        );
        let id = params.id();
        let state = test_fixtures::state()
            .with_token(Token::new(steth, 18, "stETH").with_permit("Liquid staked Ether 2.0", "2"))
            .with_token(Token::new(wsteth, 18, "wstETH").with_wrapper(Wrapper {
                underlying: steth,
                underlying_decimals: 18,
                law: WrapLaw::ExchangeRate {
                    rate: ether(2),
                },
            }))
            .with_market(Market::new(params, test_fixtures::TIMESTAMP))
            .with_holding(Holding::new(USER, steth, ether(10)));
        let collateral = Operation::new(
            USER,
            OperationKind::BlueSupplyCollateral {
                id,
                assets: Amount::exact(ether(1)),
                on_behalf: USER,
            },
        );
        let planned = plan(&[collateral], &state, &BundlerOptions::new()).unwrap();

        assert_eq!(
            action_names(&planned.bundle),
            [
                "permit",
                "erc20TransferFrom",
                "erc20WrapperDepositFor",
                "morphoSupplyCollateral",
                "erc20Transfer",
                "erc20Transfer"
            ]
        );
        let skimmed: Vec<Address> = planned.bundle.actions[4..]
            .iter()
            .map(|action| match action {
                BundlerAction::Erc20Transfer {
                    token,
                    receiver,
                    amount,
                } => {
                    assert_eq!(*receiver, USER);
                    assert_eq!(*amount, Amount::All);
                    *token
                }
                other => panic!("expected a skim, got {}", other.name()),
            })
            .collect();
        assert_eq!(skimmed, [steth, wsteth]);
        assert_eq!(planned.final_state.balance_of(USER, steth), ether(8));
        assert_eq!(planned.final_state.balance_of(adapter(), steth), U256::ZERO);
        assert_eq!(planned.final_state.balance_of(adapter(), wsteth), U256::ZERO);
    }

    #[test]
    fn test_borrow_shortfall_reallocates_once() {
        let state = test_fixtures::borrower_state();
        let planned = plan(&[borrow(usdc(6_000))], &state, &BundlerOptions::new()).unwrap();

        assert_eq!(
            action_names(&planned.bundle),
            [
                "morphoSetAuthorizationWithSig",
                "reallocateTo",
                "morphoBorrow",
                "nativeTransfer"
            ]
        );
        let BundlerAction::ReallocateTo { vault, fee, .. } = &planned.bundle.actions[1] else {
            panic!("expected a reallocation");
        };
        assert_eq!(*vault, VAULT);
        assert_eq!(planned.bundle.value, *fee);
        assert_eq!(planned.final_state.balance_of(USER, USDC), usdc(16_000));
    }

    #[test]
    fn test_unreachable_borrow_is_rejected() {
        let state = test_fixtures::borrower_state();
        let err = plan(&[borrow(usdc(7_000))], &state, &BundlerOptions::new()).unwrap_err();

        let BundlerError::Input {
            index,
            source,
            operations,
            ..
        } = err
        else {
            panic!("expected an input error, got {err}");
        };
        assert_eq!(index, 0);
        assert!(matches!(source.source, SimError::ReallocationExhausted { .. }));
        assert!(operations.is_empty());
    }

    #[test]
    fn test_chained_plans_see_next_nonce() {
        let state = test_fixtures::state();
        let options = BundlerOptions::new();
        let first = plan(&[supply(USER, usdc(1_000))], &state, &options).unwrap();
        let second = plan(&[supply(USER, usdc(500))], &first.final_state, &options).unwrap();

        let TypedMessage::Permit(message) = &second.bundle.requirements.signatures[0].message
        else {
            panic!("expected a permit");
        };
        assert_eq!(message.nonce, U256::from(4));
        assert_eq!(message.value, usdc(500));
    }

    #[test]
    fn test_without_signatures_only_transactions() {
        let state = test_fixtures::borrower_state();
        let options = BundlerOptions::new().with_supports_signature(false);
        let planned = plan(
            &[supply(USER, usdc(1_000)), borrow(usdc(100))],
            &state,
            &options,
        )
        .unwrap();

        let requirements = &planned.bundle.requirements;
        assert!(requirements.signatures.is_empty());
        let kinds: Vec<&TransactionKind> = requirements.txs.iter().map(|tx| &tx.kind).collect();
        assert!(matches!(kinds[..], [
            TransactionKind::Erc20Approve { .. },
            TransactionKind::MorphoSetAuthorization { is_authorized: true, .. },
        ]));
        assert!(planned.bundle.is_signed());
        assert!(planned.bundle.tx().is_ok());
    }

    #[tokio::test]
    async fn test_plan_and_sign_embeds_signatures() {
        let signer: PrivateKeySigner = TEST_PRIVATE_KEY.parse().unwrap();
        let user = signer.address();
        let state = test_fixtures::state().with_holding(Holding::new(user, USDC, usdc(2_000)));
        let inputs = [supply(user, usdc(1_000))];

        let unsigned = plan(&inputs, &state, &BundlerOptions::new()).unwrap();
        assert!(!unsigned.bundle.is_signed());
        assert!(matches!(
            unsigned.bundle.tx(),
            Err(BundlerError::MissingSignature { action: 0 })
        ));

        let planned = plan_and_sign(&inputs, &state, &BundlerOptions::new(), &signer)
            .await
            .unwrap();
        assert!(planned.bundle.is_signed());

        let tx = planned.bundle.tx().unwrap();
        assert_eq!(tx.to, state.addresses.bundler3);
        assert_eq!(tx.value, U256::ZERO);
        let multicall: IBundler3::multicallCall = tx.decode().unwrap();
        assert_eq!(multicall.bundle.len(), 4);
        assert_eq!(multicall.bundle[0].to, USDC);
        assert!(multicall.bundle[0].skipRevert);
        assert!(multicall.bundle[1..].iter().all(|call| call.to == adapter()));
    }

    #[tokio::test]
    async fn test_sign_with_wrong_signer() {
        let signer: PrivateKeySigner = TEST_PRIVATE_KEY.parse().unwrap();
        let state = test_fixtures::state();
        let err = plan_and_sign(&[supply(USER, usdc(1))], &state, &BundlerOptions::new(), &signer)
            .await
            .unwrap_err();

        assert!(matches!(err, BundlerError::SignerMismatch { expected: USER, .. }));
    }
}
