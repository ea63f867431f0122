//! Orchestration: `preprocess_profile` loads the document and builds the
//! name index; `read_profile` runs the matcher cascade followed by the
//! propagator, and hands back the end-of-run diagnostics.

use std::fmt;

use tracing::info;

use crate::binary_context::BinaryContext;
use crate::config::Options;
use crate::error::Error;
use crate::matcher::{self, MatchTables};
use crate::name_index::NameIndex;
use crate::profile_document::types::{Header, SCHEMA_VERSION};
use crate::profile_document::ProfileDocument;
use crate::propagator::{self, StaleProfileInferer};
use crate::similarity;

/// End-of-run diagnostics (§7 tier 3, informational). Verbosity gates
/// whether these print; they never influence matching.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub matched_exact: u32,
    pub matched_hash_only: u32,
    pub matched_lto_common_name: u32,
    pub matched_residual: u32,
    pub matched_similarity: u32,
    pub functions_propagated_ok: u32,
    pub functions_propagated_mismatched: u32,
    pub functions_unmatched: u32,
    pub num_stale_funcs_with_equal_block_count: u32,
}

impl Stats {
    pub fn total_matched(&self) -> u32 {
        self.matched_exact
            + self.matched_hash_only
            + self.matched_lto_common_name
            + self.matched_residual
            + self.matched_similarity
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Matched by exact name+hash: {}", self.matched_exact)?;
        writeln!(f, "Matched by hash only: {}", self.matched_hash_only)?;
        writeln!(
            f,
            "Matched by LTO common name: {}",
            self.matched_lto_common_name
        )?;
        writeln!(f, "Matched by residual position: {}", self.matched_residual)?;
        writeln!(f, "Matched by name similarity: {}", self.matched_similarity)?;
        writeln!(f, "Unmatched profile records: {}", self.functions_unmatched)?;
        writeln!(
            f,
            "Functions propagated cleanly: {}",
            self.functions_propagated_ok
        )?;
        write!(
            f,
            "Functions propagated with mismatches: {}",
            self.functions_propagated_mismatched
        )
    }
}

/// Flags derived from the header's event-names field.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFlags {
    pub normalize_by_insn_count: bool,
    pub normalize_by_calls: bool,
}

impl EventFlags {
    pub fn from_header(header: &Header) -> Self {
        Self {
            normalize_by_insn_count: header.event_names == "cycles"
                || header.event_names == "instructions",
            normalize_by_calls: header.event_names == "branches",
        }
    }
}

/// `usesEvent(name)`: true iff the header's single event name equals `name`.
pub fn uses_event(header: &Header, name: &str) -> bool {
    header.event_names == name
}

/// `mayHaveProfileData(fn)`.
pub fn may_have_profile_data(
    tables: &MatchTables,
    ctx: &BinaryContext,
    fid: crate::binary_context::FunctionId,
) -> bool {
    tables.name_index.may_have_profile_data(ctx, fid)
}

/// Validates the header's fatal-tier invariants and builds the Name Index
/// (component A) plus the S1 preliminary pass.
pub fn preprocess_profile(
    doc: &ProfileDocument,
    ctx: &mut BinaryContext,
    options: &Options,
) -> Result<MatchTables, Error> {
    if doc.header.version != SCHEMA_VERSION {
        return Err(Error::VersionMismatch(doc.header.version));
    }
    if doc.header.event_names.contains(',') {
        return Err(Error::MultiEvent(doc.header.event_names.clone()));
    }

    let name_index = NameIndex::build(doc, ctx, options.match_profile_with_function_hash);
    let mut tables = MatchTables::new(doc, name_index);
    matcher::preliminary(doc, ctx, &mut tables);
    Ok(tables)
}

/// Runs the matcher cascade (S2-S6) then propagates every bound pair,
/// returning the end-of-run counters.
pub fn read_profile(
    doc: &ProfileDocument,
    ctx: &mut BinaryContext,
    tables: &mut MatchTables,
    options: &Options,
    inferer: &dyn StaleProfileInferer,
) -> Stats {
    let mut stats = Stats::default();
    let event_flags = EventFlags::from_header(&doc.header);

    matcher::run_exact(doc, ctx, tables, options, &mut stats);
    if options.match_profile_with_function_hash {
        matcher::run_hash_only(doc, ctx, tables, options, &mut stats);
    }
    matcher::run_lto_common_name(doc, ctx, tables, options, &mut stats);
    matcher::run_residual(doc, tables, &mut stats);
    if options.name_similarity_threshold > 0 {
        similarity::run(doc, ctx, tables, options, &mut stats);
    }

    for (i, func) in doc.functions.iter().enumerate() {
        match tables.yaml_profile_to_function[i] {
            Some(fid) => {
                let matched = propagator::propagate(
                    ctx,
                    fid,
                    func,
                    &doc.header,
                    &tables.yaml_profile_to_function,
                    &event_flags,
                    options,
                    inferer,
                    &mut stats,
                );
                if matched {
                    stats.functions_propagated_ok += 1;
                } else {
                    stats.functions_propagated_mismatched += 1;
                }
            }
            None => stats.functions_unmatched += 1,
        }
    }

    if options.lite && options.infer_stale_profile {
        for fid in ctx.function_ids() {
            if !ctx.get(fid).has_profile() {
                ctx.get_mut(fid).set_ignored(true);
            }
        }
    }

    info!(
        exact = stats.matched_exact,
        hash_only = stats.matched_hash_only,
        lto_common_name = stats.matched_lto_common_name,
        residual = stats.matched_residual,
        similarity = stats.matched_similarity,
        unmatched = stats.functions_unmatched,
        "profile attachment complete"
    );

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_version() {
        let doc = ProfileDocument {
            header: Header {
                version: 2,
                flags: Default::default(),
                event_names: String::new(),
                hash_function: Default::default(),
                is_dfs_order: false,
            },
            functions: vec![],
        };
        let mut ctx = BinaryContext::new();
        let err = preprocess_profile(&doc, &mut ctx, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch(2)));
    }

    #[test]
    fn rejects_multi_event_profiles() {
        let doc = ProfileDocument {
            header: Header {
                version: 1,
                flags: Default::default(),
                event_names: "cycles,instructions".to_string(),
                hash_function: Default::default(),
                is_dfs_order: false,
            },
            functions: vec![],
        };
        let mut ctx = BinaryContext::new();
        let err = preprocess_profile(&doc, &mut ctx, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::MultiEvent(_)));
    }
}
