//! Morpho Blue, public allocator and GeneralAdapter1 definitions.
//!
//! The three interfaces share [`MarketParams`], so they live in one `sol!` block.

use alloy::sol;

sol! {
    struct MarketParams {
        address loanToken;
        address collateralToken;
        address oracle;
        address irm;
        uint256 lltv;
    }

    /// Morpho authorization message, signed by the authorizer.
    struct Authorization {
        address authorizer;
        address authorized;
        bool isAuthorized;
        uint256 nonce;
        uint256 deadline;
    }

    struct Signature {
        uint8 v;
        bytes32 r;
        bytes32 s;
    }

    /// One withdrawal of a public reallocation.
    struct Withdrawal {
        MarketParams marketParams;
        uint128 amount;
    }

    interface IMorpho {
        function supply(
            MarketParams marketParams,
            uint256 assets,
            uint256 shares,
            address onBehalf,
            bytes data
        ) external returns (uint256 assetsSupplied, uint256 sharesSupplied);
        function withdraw(
            MarketParams marketParams,
            uint256 assets,
            uint256 shares,
            address onBehalf,
            address receiver
        ) external returns (uint256 assetsWithdrawn, uint256 sharesWithdrawn);
        function borrow(
            MarketParams marketParams,
            uint256 assets,
            uint256 shares,
            address onBehalf,
            address receiver
        ) external returns (uint256 assetsBorrowed, uint256 sharesBorrowed);
        function repay(
            MarketParams marketParams,
            uint256 assets,
            uint256 shares,
            address onBehalf,
            bytes data
        ) external returns (uint256 assetsRepaid, uint256 sharesRepaid);
        function supplyCollateral(MarketParams marketParams, uint256 assets, address onBehalf, bytes data)
            external;
        function withdrawCollateral(MarketParams marketParams, uint256 assets, address onBehalf, address receiver)
            external;
        function accrueInterest(MarketParams marketParams) external;
        function setAuthorization(address authorized, bool newIsAuthorized) external;
        function setAuthorizationWithSig(Authorization authorization, Signature signature) external;
        function isAuthorized(address authorizer, address authorized) external view returns (bool);
        function nonce(address authorizer) external view returns (uint256);
    }

    interface IPublicAllocator {
        function reallocateTo(address vault, Withdrawal[] withdrawals, MarketParams supplyMarketParams)
            external
            payable;
        function fee(address vault) external view returns (uint256);
    }

    interface IGeneralAdapter1 {
        function erc4626Mint(address vault, uint256 shares, uint256 maxSharePriceE27, address receiver)
            external;
        function erc4626Deposit(address vault, uint256 assets, uint256 maxSharePriceE27, address receiver)
            external;
        function erc4626Withdraw(
            address vault,
            uint256 assets,
            uint256 minSharePriceE27,
            address receiver,
            address owner
        ) external;
        function erc4626Redeem(
            address vault,
            uint256 shares,
            uint256 minSharePriceE27,
            address receiver,
            address owner
        ) external;

        function morphoSupply(
            MarketParams marketParams,
            uint256 assets,
            uint256 shares,
            uint256 maxSharePriceE27,
            address onBehalf,
            bytes data
        ) external;
        function morphoSupplyCollateral(MarketParams marketParams, uint256 assets, address onBehalf, bytes data)
            external;
        function morphoBorrow(
            MarketParams marketParams,
            uint256 assets,
            uint256 shares,
            uint256 minSharePriceE27,
            address receiver
        ) external;
        function morphoRepay(
            MarketParams marketParams,
            uint256 assets,
            uint256 shares,
            uint256 maxSharePriceE27,
            address onBehalf,
            bytes data
        ) external;
        function morphoWithdraw(
            MarketParams marketParams,
            uint256 assets,
            uint256 shares,
            uint256 minSharePriceE27,
            address receiver
        ) external;
        function morphoWithdrawCollateral(MarketParams marketParams, uint256 assets, address receiver)
            external;

        function permit2TransferFrom(address token, address receiver, uint256 amount) external;
        function erc20TransferFrom(address token, address receiver, uint256 amount) external;
        function erc20Transfer(address token, address receiver, uint256 amount) external;
        function nativeTransfer(address receiver, uint256 amount) external;

        function wrapNative(uint256 amount, address receiver) external;
        function unwrapNative(uint256 amount, address receiver) external;
        function erc20WrapperDepositFor(address wrapper, address receiver, uint256 amount) external;
        function erc20WrapperWithdrawTo(address wrapper, address receiver, uint256 amount) external;
    }
}
