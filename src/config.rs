#[cfg(feature = "cli")]
use structopt::StructOpt;

/// The configuration surface recognized by the matcher and propagator (see
/// the options table in the core's external interface). None of these
/// options ever change a matching *outcome* except by enabling or disabling
/// a whole stage — ties within a stage are always broken by iteration order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(StructOpt))]
pub struct Options {
    /// Skip hash computation and comparison; shape (block count) alone
    /// determines an exact match.
    #[cfg_attr(feature = "cli", structopt(long = "profile-ignore-hash"))]
    pub ignore_hash: bool,

    /// Enable stage S3 (hash-only matching) and compute hashes for every
    /// binary function up front.
    #[cfg_attr(
        feature = "cli",
        structopt(long = "match-profile-with-function-hash")
    )]
    pub match_profile_with_function_hash: bool,

    /// Source block ordering is DFS pre-order, overriding the profile
    /// header's own `IsDFSOrder` bit.
    #[cfg_attr(feature = "cli", structopt(long = "profile-use-dfs"))]
    pub profile_use_dfs: bool,

    /// Invoke the stale-profile inference hook on mismatched functions.
    #[cfg_attr(feature = "cli", structopt(long = "infer-stale-profile"))]
    pub infer_stale_profile: bool,

    /// In combination with `infer_stale_profile`, mark unprofiled functions
    /// as ignored once propagation has run.
    #[cfg_attr(feature = "cli", structopt(long = "lite"))]
    pub lite: bool,

    /// Edit-distance threshold for the similarity matcher. Zero disables it.
    #[cfg_attr(
        feature = "cli",
        structopt(
            long = "name-similarity-function-matching-threshold",
            default_value = "0"
        )
    )]
    pub name_similarity_threshold: u32,

    /// Diagnostics verbosity. Never affects matching outcomes.
    #[cfg_attr(
        feature = "cli",
        structopt(long = "verbosity", short = "v", parse(from_occurrences))
    )]
    pub verbosity: u8,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ignore_hash: false,
            match_profile_with_function_hash: false,
            profile_use_dfs: false,
            infer_stale_profile: false,
            lite: false,
            name_similarity_threshold: 0,
            verbosity: 0,
        }
    }
}
