//! Governor contract bindings

use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract SlowTrackGovernor {
        event SlowVoteCast(
            uint256 indexed proposalId,
            address indexed voter,
            bool support,
            uint256 vpAmount,
            uint256 nonce
        );
        event ProposalFinalized(uint256 indexed proposalId, uint8 status);

        function allocationNonce(address user) external view returns (uint256);
        function proposals(uint256 proposalId) external view returns (
            uint8 track,
            uint8 status,
            uint64 votingStartsAt,
            uint64 votingEndsAt
        );
        function getDelegatedVote(uint256 proposalId, address delegate) external view returns (
            bool hasVoted,
            bool support,
            uint256 totalPowerUsed
        );
        function delegatorVoteContribution(
            uint256 proposalId,
            address delegate,
            address delegator
        ) external view returns (uint256);
        function proposalCounter() external view returns (uint256);
    }
}
