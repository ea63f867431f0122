//! Component A — Name Index.
//!
//! Maps symbol spellings and LTO common-name prefixes to candidates on both
//! sides of the match: the profile side (cleaned names, LTO buckets) and the
//! binary side (the same, via `BinaryContext`).

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet;

use crate::binary_context::{BinaryContext, FunctionId};
use crate::profile_document::ProfileDocument;
use crate::util::{clean_profile_name, lto_common_name};

#[derive(Debug, Default)]
pub struct NameIndex {
    pub profile_function_names: FxHashSet<String>,
    /// Index-aligned with `ProfileDocument::functions`.
    pub profile_bfs: Vec<Option<FunctionId>>,
    /// LTO common name -> profile ids sharing it, in document order.
    pub lto_common_name_profiles: IndexMap<String, Vec<u32>>,
    /// LTO common name -> binary functions sharing it, in container order.
    pub lto_common_name_functions: IndexMap<String, IndexSet<FunctionId>>,
    trust_hash_only: bool,
}

impl NameIndex {
    pub fn build(doc: &ProfileDocument, ctx: &BinaryContext, trust_hash_only: bool) -> Self {
        let mut index = NameIndex {
            trust_hash_only,
            ..Default::default()
        };

        for func in &doc.functions {
            let cleaned = clean_profile_name(&func.name);
            index.profile_function_names.insert(cleaned.to_string());
            let resolved = ctx.find_function_by_name(cleaned);
            index.profile_bfs.push(resolved);

            if let Some(common) = lto_common_name(cleaned) {
                index
                    .lto_common_name_profiles
                    .entry(common.to_string())
                    .or_default()
                    .push(func.id);
            }
        }

        for fid in ctx.function_ids() {
            for name in ctx.get(fid).get_names() {
                if let Some(common) = lto_common_name(name) {
                    index
                        .lto_common_name_functions
                        .entry(common.to_string())
                        .or_default()
                        .insert(fid);
                }
            }
        }

        index
    }

    /// True if `fid` might be the target of some profile record: any of its
    /// names is a cleaned profile name, any of its LTO common names
    /// collides with a profiled common name, or the run trusts hash
    /// matching alone.
    pub fn may_have_profile_data(&self, ctx: &BinaryContext, fid: FunctionId) -> bool {
        if self.trust_hash_only {
            return true;
        }
        let bf = ctx.get(fid);
        if bf
            .get_names()
            .iter()
            .any(|n| self.profile_function_names.contains(n))
        {
            return true;
        }
        bf.get_names().iter().any(|n| {
            lto_common_name(n)
                .map(|common| self.lto_common_name_profiles.contains_key(common))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary_context::{BasicBlock, BinaryFunction};
    use crate::profile_document::types::{Header, ProfiledFunction};

    fn doc_with_names(names: &[&str]) -> ProfileDocument {
        ProfileDocument {
            header: Header {
                version: 1,
                flags: Default::default(),
                event_names: String::new(),
                hash_function: Default::default(),
                is_dfs_order: false,
            },
            functions: names
                .iter()
                .enumerate()
                .map(|(i, n)| ProfiledFunction {
                    id: i as u32,
                    name: n.to_string(),
                    hash: 0,
                    num_basic_blocks: 1,
                    exec_count: 0,
                    blocks: vec![],
                })
                .collect(),
        }
    }

    #[test]
    fn resolves_name_match() {
        let doc = doc_with_names(&["foo(*1", "bar"]);
        let mut ctx = BinaryContext::new();
        let foo = ctx.push_function(BinaryFunction::new(
            vec!["foo".to_string()],
            "foo".to_string(),
            vec![BasicBlock::new(0, 4).entry()],
        ));
        let index = NameIndex::build(&doc, &ctx, false);
        assert_eq!(index.profile_bfs[0], Some(foo));
        assert_eq!(index.profile_bfs[1], None);
        assert!(index.may_have_profile_data(&ctx, foo));
    }

    #[test]
    fn buckets_by_lto_common_name() {
        let doc = doc_with_names(&["foo.llvm.111"]);
        let mut ctx = BinaryContext::new();
        let foo2 = ctx.push_function(BinaryFunction::new(
            vec!["foo.llvm.222".to_string()],
            "foo".to_string(),
            vec![BasicBlock::new(0, 4).entry()],
        ));
        let index = NameIndex::build(&doc, &ctx, false);
        assert_eq!(index.profile_bfs[0], None);
        assert!(index.lto_common_name_profiles.contains_key("foo"));
        assert!(index.lto_common_name_functions["foo"].contains(&foo2));
    }
}
