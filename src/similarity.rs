//! Component D — Similarity Matcher.
//!
//! The last-resort stage, gated behind a nonzero edit-distance threshold:
//! buckets every still-unclaimed profile record and binary function by
//! demangled namespace and block count, then binds the closest name within a
//! bucket if it clears the threshold.

use std::collections::HashMap;

use crate::binary_context::{BinaryContext, FunctionId};
use crate::config::Options;
use crate::profile_document::ProfileDocument;
use crate::reader::Stats;
use crate::matcher::MatchTables;
use crate::util::{demangle_profile_name, namespace_of, namespace_of_profile_name};

/// Key a namespace+block-count bucket is grouped by.
type BucketKey = (String, u32);

/// S6 — greedy nearest-neighbor by Levenshtein distance within a
/// namespace/block-count bucket, subject to `name-similarity-function-matching-threshold`.
pub fn run(
    doc: &ProfileDocument,
    ctx: &mut BinaryContext,
    tables: &mut MatchTables,
    options: &Options,
    stats: &mut Stats,
) {
    let threshold = options.name_similarity_threshold;
    if threshold == 0 {
        return;
    }

    let mut function_buckets: HashMap<BucketKey, Vec<FunctionId>> = HashMap::new();
    for fid in ctx.function_ids() {
        if tables.profiled_functions.contains(&fid) {
            continue;
        }
        let bf = ctx.get(fid);
        // `get_demangled_name()` is already demangled (§3/§6); re-demangling it
        // would only fail (it isn't Itanium-mangled input) and collapse every
        // function into the empty namespace.
        let namespace = namespace_of(bf.get_demangled_name()).to_string();
        function_buckets
            .entry((namespace, bf.size() as u32))
            .or_default()
            .push(fid);
    }

    for (i, func) in doc.functions.iter().enumerate() {
        if tables.used[i] {
            continue;
        }
        let namespace = namespace_of_profile_name(&func.name);
        let Some(candidates) = function_buckets.get(&(namespace, func.num_basic_blocks)) else {
            continue;
        };

        let mut best: Option<(FunctionId, usize)> = None;
        for &fid in candidates {
            if tables.profiled_functions.contains(&fid) {
                continue;
            }
            // Compare demangled-vs-demangled per spec §4.D step 4, not the
            // raw (possibly still-mangled) profile name against a demangled one.
            let demangled_profile_name = demangle_profile_name(&func.name);
            let distance =
                strsim::levenshtein(&demangled_profile_name, ctx.get(fid).get_demangled_name());
            if best.map(|(_, d)| distance < d).unwrap_or(true) {
                best = Some((fid, distance));
            }
        }

        if let Some((fid, distance)) = best {
            if distance as u32 <= threshold {
                tables.yaml_profile_to_function[i] = Some(fid);
                tables.used[i] = true;
                tables.profiled_functions.insert(fid);
                stats.matched_similarity += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary_context::{BasicBlock, BinaryFunction};
    use crate::name_index::NameIndex;
    use crate::profile_document::types::{Header, ProfiledFunction};

    fn doc_with(name: &str, blocks: u32) -> ProfileDocument {
        ProfileDocument {
            header: Header {
                version: 1,
                flags: Default::default(),
                event_names: String::new(),
                hash_function: Default::default(),
                is_dfs_order: false,
            },
            functions: vec![ProfiledFunction {
                id: 0,
                name: name.to_string(),
                hash: 0,
                num_basic_blocks: blocks,
                exec_count: 0,
                blocks: vec![],
            }],
        }
    }

    fn bf(demangled: &str, blocks: usize) -> BinaryFunction {
        let mut bbs = vec![BasicBlock::new(0, 4).entry()];
        for i in 1..blocks {
            bbs.push(BasicBlock::new(i as u32 * 4, 4));
        }
        BinaryFunction::new(vec![demangled.to_string()], demangled.to_string(), bbs)
    }

    #[test]
    fn binds_closest_name_within_threshold() {
        let doc = doc_with("ns::bar", 1);
        let mut ctx = BinaryContext::new();
        let target = ctx.push_function(bf("ns::baz", 1));

        let name_index = NameIndex::build(&doc, &ctx, false);
        let mut tables = MatchTables::new(&doc, name_index);
        let options = Options {
            name_similarity_threshold: 3,
            ..Default::default()
        };
        let mut stats = Stats::default();
        run(&doc, &mut ctx, &mut tables, &options, &mut stats);

        assert_eq!(tables.yaml_profile_to_function[0], Some(target));
        assert_eq!(stats.matched_similarity, 1);
    }

    #[test]
    fn binds_mangled_profile_name_via_demangled_binary_name() {
        // Exercises the real path: a profile record whose name is still
        // Itanium-mangled against a binary function whose name is already
        // demangled, per the data model's `getDemangledName` contract.
        let doc = doc_with("_ZN2ns3barEv", 1);
        let mut ctx = BinaryContext::new();
        let target = ctx.push_function(bf("ns::baz()", 1));

        let name_index = NameIndex::build(&doc, &ctx, false);
        let mut tables = MatchTables::new(&doc, name_index);
        let options = Options {
            name_similarity_threshold: 3,
            ..Default::default()
        };
        let mut stats = Stats::default();
        run(&doc, &mut ctx, &mut tables, &options, &mut stats);

        assert_eq!(tables.yaml_profile_to_function[0], Some(target));
        assert_eq!(stats.matched_similarity, 1);
    }

    #[test]
    fn rejects_matches_beyond_threshold() {
        let doc = doc_with("ns::completelydifferent", 1);
        let mut ctx = BinaryContext::new();
        ctx.push_function(bf("ns::x", 1));

        let name_index = NameIndex::build(&doc, &ctx, false);
        let mut tables = MatchTables::new(&doc, name_index);
        let options = Options {
            name_similarity_threshold: 2,
            ..Default::default()
        };
        let mut stats = Stats::default();
        run(&doc, &mut ctx, &mut tables, &options, &mut stats);

        assert_eq!(tables.yaml_profile_to_function[0], None);
        assert_eq!(stats.matched_similarity, 0);
    }

    #[test]
    fn disabled_when_threshold_is_zero() {
        let doc = doc_with("ns::bar", 1);
        let mut ctx = BinaryContext::new();
        ctx.push_function(bf("ns::baz", 1));

        let name_index = NameIndex::build(&doc, &ctx, false);
        let mut tables = MatchTables::new(&doc, name_index);
        let mut stats = Stats::default();
        run(&doc, &mut ctx, &mut tables, &Options::default(), &mut stats);

        assert_eq!(tables.yaml_profile_to_function[0], None);
    }
}
