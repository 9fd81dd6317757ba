//! Permit2 `AllowanceTransfer` definitions.

use alloy::sol;

sol! {
    struct PermitDetails {
        address token;
        uint160 amount;
        uint48 expiration;
        uint48 nonce;
    }

    /// Permit2 single-token allowance message.
    struct PermitSingle {
        PermitDetails details;
        address spender;
        uint256 sigDeadline;
    }

    interface IAllowanceTransfer {
        function permit(address owner, PermitSingle permitSingle, bytes signature) external;
        function transferFrom(address from, address to, uint160 amount, address token) external;
        function allowance(address user, address token, address spender)
            external
            view
            returns (uint160 amount, uint48 expiration, uint48 nonce);
    }
}
