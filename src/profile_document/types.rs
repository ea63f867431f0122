use serde::Deserialize;

/// The only schema version this core accepts.
pub const SCHEMA_VERSION: u64 = 1;

/// Sentinel written into a block's execution count before propagation and
/// left there for any block that propagation never touches; finalization
/// turns any surviving sentinel into a plain zero.
pub const COUNT_NO_PROFILE: u64 = u64::MAX;

/// Hash function used to compute a binary function's fingerprint, as
/// recorded in the profile header. The concrete algorithm behind each
/// variant is an external, out-of-scope concern (see `BinaryFunction::hash`);
/// this enum only identifies which one the producer used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFunction {
    Std,
    Xxh3,
}

impl Default for HashFunction {
    fn default() -> Self {
        HashFunction::Std
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Flags {
    /// Sample-based profile: blocks carry `EventCount`, not branch counts.
    #[serde(default)]
    pub sample: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    #[serde(rename = "profile-version")]
    pub version: u64,
    #[serde(default)]
    pub flags: Flags,
    /// Single event name (comma-separated multi-event profiles are rejected
    /// by `preprocess_profile`, not by the loader).
    #[serde(rename = "profile-event-names", default)]
    pub event_names: String,
    #[serde(rename = "hash-func", default)]
    pub hash_function: HashFunction,
    #[serde(rename = "dfs-order", default)]
    pub is_dfs_order: bool,
}

/// `(DestId into the Functions table or 0, EntryDiscriminator, byte Offset
/// from function start, Count, Mispreds)`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallSite {
    #[serde(rename = "dest-id", default)]
    pub dest_id: u32,
    #[serde(rename = "entry-discriminator", default)]
    pub entry_discriminator: u32,
    pub offset: u32,
    pub count: u64,
    #[serde(default)]
    pub mispreds: u64,
}

/// `(target block Index, Count, Mispreds)`.
#[derive(Debug, Clone, Deserialize)]
pub struct Successor {
    pub index: u32,
    pub count: u64,
    #[serde(default)]
    pub mispreds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfiledBlock {
    /// Position in the producer's block ordering (layout or DFS pre-order,
    /// per `Header::is_dfs_order`).
    pub index: u32,
    #[serde(rename = "exec-count", default)]
    pub exec_count: u64,
    /// Only populated in sample mode.
    #[serde(rename = "event-count", default)]
    pub event_count: Option<u64>,
    #[serde(rename = "call-sites", default)]
    pub call_sites: Vec<CallSite>,
    #[serde(default)]
    pub successors: Vec<Successor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfiledFunction {
    /// Small dense integer used as the key into `YamlProfileToFunction`.
    pub id: u32,
    /// May carry a trailing `"(*…"` disambiguator; use
    /// [`crate::util::clean_profile_name`] before looking it up.
    pub name: String,
    pub hash: u64,
    #[serde(rename = "num-basic-blocks")]
    pub num_basic_blocks: u32,
    #[serde(rename = "exec-count", default)]
    pub exec_count: u64,
    #[serde(default)]
    pub blocks: Vec<ProfiledBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileDocument {
    pub header: Header,
    #[serde(default)]
    pub functions: Vec<ProfiledFunction>,
}
