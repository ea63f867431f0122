//! Component C — Matcher.
//!
//! Drives the ordered stage cascade. Each stage skips profile records
//! already `Used` and binary functions already in `ProfiledFunctions`; the
//! stages are kept as separate passes (never fused) because which stage
//! claims a pair is itself an observable, tested outcome (P7).

use indexmap::IndexSet;
use rustc_hash::FxHashSet;
use tracing::warn;

use crate::binary_context::{BinaryContext, FunctionId};
use crate::config::Options;
use crate::hash_index;
use crate::name_index::NameIndex;
use crate::profile_document::ProfileDocument;
use crate::reader::Stats;

/// The reader's own bookkeeping tables, owned for the lifetime of one
/// `read_profile` call.
#[derive(Debug)]
pub struct MatchTables {
    pub name_index: NameIndex,
    /// Index-aligned with `ProfileDocument::functions`.
    pub used: Vec<bool>,
    pub profiled_functions: FxHashSet<FunctionId>,
    /// Sized `functions.len() + 1`; the `+1` has no documented meaning and
    /// slot zero should not be relied upon (see spec Open Question).
    pub yaml_profile_to_function: Vec<Option<FunctionId>>,
}

impl MatchTables {
    pub fn new(doc: &ProfileDocument, name_index: NameIndex) -> Self {
        let n = doc.functions.len();
        Self {
            name_index,
            used: vec![false; n],
            profiled_functions: FxHashSet::default(),
            yaml_profile_to_function: vec![None; n + 1],
        }
    }
}

/// `profile-use-dfs` only ever forces DFS order on; it never suppresses the
/// header's own `IsDFSOrder` bit (see propagator.rs, which must agree with
/// every hash computed here).
fn is_dfs(options: &Options, doc: &ProfileDocument) -> bool {
    options.profile_use_dfs || doc.header.is_dfs_order
}

fn claim(tables: &mut MatchTables, profile_index: usize, fid: FunctionId) {
    tables.yaml_profile_to_function[profile_index] = Some(fid);
    tables.used[profile_index] = true;
    tables.profiled_functions.insert(fid);
}

/// S1 — preliminary pass, run during preprocessing: for each name-matched
/// pair, stash a provisional `ExecCount` on the binary function, or drop the
/// name-match slot with a warning if two profile records would otherwise
/// claim the same function before any real matching has happened.
pub fn preliminary(doc: &ProfileDocument, ctx: &mut BinaryContext, tables: &mut MatchTables) {
    let mut claimed_preliminarily = FxHashSet::default();
    for (i, func) in doc.functions.iter().enumerate() {
        if let Some(fid) = tables.name_index.profile_bfs[i] {
            if claimed_preliminarily.contains(&fid) {
                warn!(function = %func.name, "duplicate profile for binary function, dropping name match");
                tables.name_index.profile_bfs[i] = None;
            } else {
                claimed_preliminarily.insert(fid);
                ctx.get_mut(fid).set_execution_count(func.exec_count);
            }
        }
    }
}

/// S2 — exact match: name-matched pair whose shapes agree (hash, or block
/// count under `IgnoreHash`).
pub fn run_exact(
    doc: &ProfileDocument,
    ctx: &mut BinaryContext,
    tables: &mut MatchTables,
    options: &Options,
    stats: &mut Stats,
) {
    for (i, func) in doc.functions.iter().enumerate() {
        if tables.used[i] {
            continue;
        }
        let Some(fid) = tables.name_index.profile_bfs[i] else {
            continue;
        };
        if tables.profiled_functions.contains(&fid) {
            continue;
        }

        // Clear the preliminary count before deciding; S2 either confirms it
        // with a real propagation later or leaves the sentinel in place.
        ctx.get_mut(fid)
            .set_execution_count(crate::profile_document::COUNT_NO_PROFILE);

        let matches = if options.ignore_hash {
            ctx.get(fid).size() as u32 == func.num_basic_blocks
        } else {
            ctx.get(fid).compute_hash(is_dfs(options, doc), doc.header.hash_function) == func.hash
        };

        if matches {
            claim(tables, i, fid);
            stats.matched_exact += 1;
        }
    }
}

/// S3 — hash-only match (gated by `match-profile-with-function-hash`):
/// builds a dense hash map over every binary function and matches any
/// still-unclaimed record by its recorded hash alone.
pub fn run_hash_only(
    doc: &ProfileDocument,
    ctx: &mut BinaryContext,
    tables: &mut MatchTables,
    options: &Options,
    stats: &mut Stats,
) {
    let dense = hash_index::build_dense_map(ctx, is_dfs(options, doc), doc.header.hash_function);
    for (i, func) in doc.functions.iter().enumerate() {
        if tables.used[i] {
            continue;
        }
        let Some(&fid) = dense.get(&func.hash) else {
            continue;
        };
        if tables.profiled_functions.contains(&fid) {
            continue;
        }
        claim(tables, i, fid);
        stats.matched_hash_only += 1;
    }
}

/// S4 — LTO common name: for each common name present on both sides, first
/// try the unambiguous single-candidate-each-side case, then fall back to a
/// shape-matching scan in container order.
pub fn run_lto_common_name(
    doc: &ProfileDocument,
    ctx: &mut BinaryContext,
    tables: &mut MatchTables,
    options: &Options,
    stats: &mut Stats,
) {
    let common_names: Vec<String> = tables
        .name_index
        .lto_common_name_profiles
        .keys()
        .cloned()
        .collect();

    for common in common_names {
        let Some(function_ids) = tables.name_index.lto_common_name_functions.get(&common) else {
            continue;
        };
        let profile_ids = tables.name_index.lto_common_name_profiles[&common].clone();

        let unused_profiles: Vec<u32> = profile_ids
            .iter()
            .copied()
            .filter(|&pid| !tables.used[pid as usize])
            .collect();
        let unclaimed_functions: IndexSet<FunctionId> = function_ids
            .iter()
            .copied()
            .filter(|fid| !tables.profiled_functions.contains(fid))
            .collect();

        if unused_profiles.is_empty() || unclaimed_functions.is_empty() {
            continue;
        }

        if unused_profiles.len() == 1 && unclaimed_functions.len() == 1 {
            let pid = unused_profiles[0];
            let fid = *unclaimed_functions.iter().next().unwrap();
            claim(tables, pid as usize, fid);
            stats.matched_lto_common_name += 1;
            continue;
        }

        'outer: for fid in &unclaimed_functions {
            for &pid in &unused_profiles {
                let func = &doc.functions[pid as usize];
                let matches = if options.ignore_hash {
                    ctx.get(*fid).size() as u32 == func.num_basic_blocks
                } else {
                    ctx.get(*fid).compute_hash(is_dfs(options, doc), doc.header.hash_function)
                        == func.hash
                };
                if matches {
                    claim(tables, pid as usize, *fid);
                    stats.matched_lto_common_name += 1;
                    break 'outer;
                }
            }
        }
    }
}

/// S5 — residual by position: binds whatever positional name-match survived
/// S2 without re-checking shape; `inferStaleProfile` is expected to
/// reconcile any mismatch downstream. Per the spec's open question, this
/// implementation explicitly re-checks `ProfiledFunctions` rather than
/// relying on the slot already being live.
pub fn run_residual(doc: &ProfileDocument, tables: &mut MatchTables, stats: &mut Stats) {
    for (i, _func) in doc.functions.iter().enumerate() {
        if tables.used[i] {
            continue;
        }
        let Some(fid) = tables.name_index.profile_bfs[i] else {
            continue;
        };
        if tables.profiled_functions.contains(&fid) {
            continue;
        }
        claim(tables, i, fid);
        stats.matched_residual += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary_context::{BasicBlock, BinaryFunction};
    use crate::profile_document::types::{Header, ProfiledFunction};

    fn bf(name: &str, blocks: usize) -> BinaryFunction {
        let mut bbs = vec![BasicBlock::new(0, 4).entry()];
        for i in 1..blocks {
            bbs.push(BasicBlock::new((i as u32) * 4, 4));
        }
        BinaryFunction::new(vec![name.to_string()], name.to_string(), bbs)
    }

    fn pf(id: u32, name: &str, hash: u64, blocks: u32) -> ProfiledFunction {
        ProfiledFunction {
            id,
            name: name.to_string(),
            hash,
            num_basic_blocks: blocks,
            exec_count: 0,
            blocks: vec![],
        }
    }

    #[test]
    fn stage_order_prefers_exact_over_hash_only() {
        let mut ctx = BinaryContext::new();
        let f_old = ctx.push_function(bf("f_old", 1));
        let hash = ctx.get(f_old).compute_hash(false, Default::default());

        let doc = ProfileDocument {
            header: Header {
                version: 1,
                flags: Default::default(),
                event_names: String::new(),
                hash_function: Default::default(),
                is_dfs_order: false,
            },
            functions: vec![pf(0, "f_old", hash, 1)],
        };

        let name_index = NameIndex::build(&doc, &ctx, false);
        let mut tables = MatchTables::new(&doc, name_index);
        preliminary(&doc, &mut ctx, &mut tables);

        let options = Options {
            match_profile_with_function_hash: true,
            ..Default::default()
        };
        let mut stats = Stats::default();
        run_exact(&doc, &mut ctx, &mut tables, &options, &mut stats);
        run_hash_only(&doc, &mut ctx, &mut tables, &options, &mut stats);

        assert_eq!(stats.matched_exact, 1);
        assert_eq!(stats.matched_hash_only, 0);
        assert_eq!(tables.yaml_profile_to_function[0], Some(f_old));
    }

    #[test]
    fn hash_only_requires_flag() {
        let mut ctx = BinaryContext::new();
        let f_new = ctx.push_function(bf("f_new", 1));
        let hash = ctx.get(f_new).compute_hash(false, Default::default());

        let doc = ProfileDocument {
            header: Header {
                version: 1,
                flags: Default::default(),
                event_names: String::new(),
                hash_function: Default::default(),
                is_dfs_order: false,
            },
            functions: vec![pf(0, "f_old", hash, 1)],
        };

        let name_index = NameIndex::build(&doc, &ctx, false);
        let mut tables = MatchTables::new(&doc, name_index);
        preliminary(&doc, &mut ctx, &mut tables);

        let options = Options::default();
        let mut stats = Stats::default();
        run_exact(&doc, &mut ctx, &mut tables, &options, &mut stats);
        assert_eq!(tables.yaml_profile_to_function[0], None);
    }

    #[test]
    fn residual_rechecks_profiled_functions() {
        let mut ctx = BinaryContext::new();
        let f_a = ctx.push_function(bf("f_a", 1));
        let f_b = ctx.push_function(bf("f_b", 1));

        let doc = ProfileDocument {
            header: Header {
                version: 1,
                flags: Default::default(),
                event_names: String::new(),
                hash_function: Default::default(),
                is_dfs_order: false,
            },
            functions: vec![pf(0, "f_a", 0, 1), pf(1, "f_b", 0, 1)],
        };

        let name_index = NameIndex::build(&doc, &ctx, false);
        let mut tables = MatchTables::new(&doc, name_index);
        preliminary(&doc, &mut ctx, &mut tables);

        // Simulate f_b already bound by an earlier stage, so S5's name match
        // for record 1 (which still points at f_b) must not double-claim it.
        tables.profiled_functions.insert(f_b);

        let mut stats = Stats::default();
        run_residual(&doc, &mut tables, &mut stats);

        assert_eq!(tables.yaml_profile_to_function[0], Some(f_a));
        assert_eq!(stats.matched_residual, 1);
        assert_eq!(tables.yaml_profile_to_function[1], None);
        assert!(!tables.used[1]);
    }
}
