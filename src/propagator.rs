//! Component E — Propagator.
//!
//! Stamps execution, branch, and call-site counts from one matched profile
//! record onto the corresponding binary function's CFG.

use tracing::warn;

use crate::binary_context::{
    BinaryContext, CallProfileEntry, CallSiteRecord, FunctionId, InstructionKind,
};
use crate::config::Options;
use crate::profile_document::types::{
    CallSite as ProfiledCallSite, Header, ProfiledBlock, ProfiledFunction, COUNT_NO_PROFILE,
};
use crate::reader::{EventFlags, Stats};

/// Stands in for the downstream min-cost-flow stale-profile inference pass.
/// The default implementation never rescues a mismatched function.
pub trait StaleProfileInferer {
    fn infer(&self, ctx: &mut BinaryContext, fid: FunctionId, yaml_fn: &ProfiledFunction) -> bool;
}

/// No-op inferer used when `infer-stale-profile` is unset.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverInfer;

impl StaleProfileInferer for NeverInfer {
    fn infer(&self, _ctx: &mut BinaryContext, _fid: FunctionId, _yaml_fn: &ProfiledFunction) -> bool {
        false
    }
}

/// Propagates `yaml_fn`'s counts onto `fid`'s CFG. Returns the
/// `ProfileMatched` verdict.
#[allow(clippy::too_many_arguments)]
pub fn propagate(
    ctx: &mut BinaryContext,
    fid: FunctionId,
    yaml_fn: &ProfiledFunction,
    header: &Header,
    yaml_profile_to_function: &[Option<FunctionId>],
    event_flags: &EventFlags,
    options: &Options,
    inferer: &dyn StaleProfileInferer,
    stats: &mut Stats,
) -> bool {
    if ctx.get(fid).is_empty() {
        ctx.get_mut(fid).profile_matched = true;
        return true;
    }

    let is_dfs = options.profile_use_dfs || header.is_dfs_order;
    let order = if is_dfs {
        ctx.get(fid).dfs()
    } else {
        ctx.get(fid).layout_order()
    };

    ctx.get_mut(fid).set_execution_count(yaml_fn.exec_count);
    let raw_branch_count: u64 = yaml_fn
        .blocks
        .iter()
        .flat_map(|b| b.successors.iter())
        .map(|s| s.count)
        .sum();
    ctx.get_mut(fid).set_raw_branch_count(raw_branch_count);

    let mut shape_ok = true;
    if !options.ignore_hash {
        let hash = ctx.get(fid).compute_hash(is_dfs, header.hash_function);
        if hash != yaml_fn.hash {
            shape_ok = false;
            warn!(function = ?ctx.get(fid).get_names(), "profile hash mismatch");
        }
    } else if ctx.get(fid).size() as u32 != yaml_fn.num_basic_blocks {
        shape_ok = false;
        warn!(function = ?ctx.get(fid).get_names(), "profile block count mismatch");
    }

    for block in &mut ctx.get_mut(fid).blocks {
        block.exec_count = COUNT_NO_PROFILE;
    }

    let mut mismatched_blocks = 0u32;
    let mut mismatched_calls = 0u32;
    let mut mismatched_edges = 0u32;
    let mut function_execution_count = 0u64;
    let is_sample = header.flags.sample;

    for pb in &yaml_fn.blocks {
        if pb.index as usize >= order.len() {
            mismatched_blocks += 1;
            warn!(index = pb.index, "profile block index out of range");
            continue;
        }
        let block_id = order[pb.index as usize];

        if is_sample {
            function_execution_count +=
                apply_sample_block(ctx, fid, block_id, pb, event_flags);
            continue;
        }

        ctx.get_mut(fid).blocks[block_id.0].exec_count = pb.exec_count;

        apply_call_sites(ctx, fid, block_id, pb, yaml_profile_to_function, &mut mismatched_calls);
        apply_successors(ctx, fid, block_id, pb, &order, &mut mismatched_edges);
    }

    for block in &mut ctx.get_mut(fid).blocks {
        if block.exec_count == COUNT_NO_PROFILE {
            block.exec_count = 0;
        }
    }
    if is_sample {
        ctx.get_mut(fid).set_execution_count(function_execution_count);
    }

    if !shape_ok
        && options.infer_stale_profile
        && ctx.get(fid).size() as u32 == yaml_fn.num_basic_blocks
    {
        stats.num_stale_funcs_with_equal_block_count += 1;
    }

    let mut matched =
        shape_ok && mismatched_blocks == 0 && mismatched_calls == 0 && mismatched_edges == 0;
    if !matched && options.infer_stale_profile {
        matched = inferer.infer(ctx, fid, yaml_fn);
    }

    ctx.get_mut(fid).profile_matched = matched;
    if matched {
        ctx.get_mut(fid).mark_profiled(header);
    }
    matched
}

/// Sample-mode block handling: no branch or call-site annotations are
/// written (P5). Returns this block's contribution to the running
/// function-level execution count, which is only nonzero for entry blocks.
fn apply_sample_block(
    ctx: &mut BinaryContext,
    fid: FunctionId,
    block_id: crate::binary_context::BlockId,
    pb: &ProfiledBlock,
    event_flags: &EventFlags,
) -> u64 {
    let event_count = pb.event_count.unwrap_or(0);
    let bf = ctx.get_mut(fid);
    let block = &mut bf.blocks[block_id.0];

    let exec = if event_count == 0 {
        0
    } else {
        let scaled = event_count * 1000;
        if event_flags.normalize_by_insn_count && block.num_non_pseudo_instructions > 0 {
            scaled / block.num_non_pseudo_instructions as u64
        } else if event_flags.normalize_by_calls {
            scaled / (block.num_calls as u64 + 1)
        } else {
            scaled
        }
    };
    block.exec_count = exec;

    if block.is_entry {
        exec
    } else {
        0
    }
}

fn apply_call_sites(
    ctx: &mut BinaryContext,
    fid: FunctionId,
    block_id: crate::binary_context::BlockId,
    pb: &ProfiledBlock,
    yaml_profile_to_function: &[Option<FunctionId>],
    mismatched_calls: &mut u32,
) {
    for cs in &pb.call_sites {
        record_call_site(ctx, fid, block_id, cs, yaml_profile_to_function, mismatched_calls);
    }
}

fn record_call_site(
    ctx: &mut BinaryContext,
    fid: FunctionId,
    block_id: crate::binary_context::BlockId,
    cs: &ProfiledCallSite,
    yaml_profile_to_function: &[Option<FunctionId>],
    mismatched_calls: &mut u32,
) {
    let callee_fid = yaml_profile_to_function
        .get(cs.dest_id as usize)
        .copied()
        .flatten();
    let callee_symbol = callee_fid.and_then(|cf| ctx.get(cf).symbol_for_entry(cf, cs.entry_discriminator));

    let (input_offset, original_size) = {
        let block = &ctx.get(fid).blocks[block_id.0];
        (block.input_offset, block.original_size)
    };

    ctx.get_mut(fid).push_call_site(CallSiteRecord {
        callee: callee_symbol,
        count: cs.count,
        mispreds: cs.mispreds,
        offset: cs.offset,
    });

    if cs.offset >= original_size {
        *mismatched_calls += 1;
        warn!(offset = cs.offset, "call-site offset outside block");
        return;
    }
    let abs_offset = input_offset + cs.offset;
    let Some(kind) = ctx.get(fid).instruction_at_offset(abs_offset).map(|i| i.kind) else {
        *mismatched_calls += 1;
        warn!(offset = abs_offset, "no instruction at call-site offset");
        return;
    };
    if !kind.is_call_site() {
        *mismatched_calls += 1;
        warn!(offset = abs_offset, "instruction at call-site offset is not a call");
        return;
    }

    let insn = ctx
        .get_mut(fid)
        .instruction_at_offset_mut(abs_offset)
        .expect("checked above");

    match kind {
        InstructionKind::IndirectCall | InstructionKind::IndirectBranch => {
            insn.annotations.push_call_profile(CallProfileEntry {
                callee: callee_symbol,
                count: cs.count,
                mispreds: cs.mispreds,
            });
        }
        InstructionKind::ConditionalTailCall => {
            if !insn.annotations.set_scalar_once("CTCTakenCount", cs.count) {
                warn!(offset = abs_offset, "duplicate CTCTakenCount annotation");
            }
            if !insn
                .annotations
                .set_scalar_once("CTCMispredCount", cs.mispreds)
            {
                warn!(offset = abs_offset, "duplicate CTCMispredCount annotation");
            }
        }
        InstructionKind::Call => {
            if !insn.annotations.set_scalar_once("Count", cs.count) {
                warn!(offset = abs_offset, "duplicate Count annotation");
            }
        }
        InstructionKind::Other => unreachable!("filtered above"),
    }
}

fn apply_successors(
    ctx: &mut BinaryContext,
    fid: FunctionId,
    block_id: crate::binary_context::BlockId,
    pb: &ProfiledBlock,
    order: &[crate::binary_context::BlockId],
    mismatched_edges: &mut u32,
) {
    for succ in &pb.successors {
        if succ.index as usize >= order.len() {
            *mismatched_edges += 1;
            warn!(index = succ.index, "successor block index out of range");
            continue;
        }
        let mut to_block_id = order[succ.index as usize];

        let has_direct_edge = ctx.get(fid).blocks[block_id.0]
            .successor_edge(to_block_id)
            .is_some();

        if !has_direct_edge {
            let fallthrough = ctx.get(fid).blocks[block_id.0].fallthrough_successor;
            let rescued = fallthrough.and_then(|ft| {
                let ft_block = &ctx.get(fid).blocks[ft.0];
                if ft_block.successors.len() == 1 && ft_block.successors[0].target == to_block_id {
                    Some(ft)
                } else {
                    None
                }
            });

            match rescued {
                Some(ft) => {
                    let edge = ctx.get_mut(fid).blocks[ft.0]
                        .successor_edge_mut(to_block_id)
                        .expect("checked above");
                    edge.count += succ.count;
                    edge.mispredicted_count += succ.mispreds;
                    to_block_id = ft;
                }
                None => {
                    *mismatched_edges += 1;
                    warn!(
                        index = succ.index,
                        "no successor edge and pass-through heuristic did not apply"
                    );
                    continue;
                }
            }
        }

        match ctx.get_mut(fid).blocks[block_id.0].successor_edge_mut(to_block_id) {
            Some(edge) => {
                edge.count += succ.count;
                edge.mispredicted_count += succ.mispreds;
            }
            None => {
                *mismatched_edges += 1;
                warn!(index = succ.index, "successor edge vanished after pass-through");
            }
        }
    }
}
