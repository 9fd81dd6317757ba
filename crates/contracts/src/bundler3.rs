//! Bundler3 multicall definitions.

use alloy::sol;

sol! {
    /// One call of a Bundler3 bundle.
    struct Call {
        address to;
        bytes data;
        uint256 value;
        bool skipRevert;
        bytes32 callbackHash;
    }

    interface IBundler3 {
        function multicall(Call[] bundle) external payable;
        function initiator() external view returns (address);
    }
}
