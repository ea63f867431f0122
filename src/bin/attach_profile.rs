use std::path::PathBuf;

use anyhow::{Context, Result};
use structopt::StructOpt;
use tracing::info;

use profattach::binary_context::{BasicBlock, BinaryContext, BinaryFunction, BlockId};
use profattach::profile_document::{self, ProfiledFunction};
use profattach::{preprocess_profile, read_profile, Options};

#[derive(Debug, StructOpt)]
#[structopt(name = "attach_profile", about = "Attach a recorded profile to a binary's control-flow graphs")]
struct Opts {
    /// Path to the profile YAML document to attach.
    #[structopt(long = "profile", short = "p")]
    profile: PathBuf,

    #[structopt(flatten)]
    options: Options,
}

/// Builds a stand-in `BinaryContext` whose functions mirror the shape of
/// every record in `doc`, so a profile can be attached to *something* without
/// a real disassembler (out of scope for this core, see SPEC_FULL.md §D).
fn synthetic_binary_context(doc: &profile_document::ProfileDocument) -> BinaryContext {
    let mut ctx = BinaryContext::new();
    for func in &doc.functions {
        ctx.push_function(synthetic_function(func));
    }
    ctx
}

fn synthetic_function(func: &ProfiledFunction) -> BinaryFunction {
    let name = profattach::util::clean_profile_name(&func.name).to_string();
    let num_blocks = func.num_basic_blocks.max(1) as usize;

    let mut successors: Vec<Vec<BlockId>> = vec![Vec::new(); num_blocks];
    for pb in &func.blocks {
        let Some(targets) = successors.get_mut(pb.index as usize) else {
            continue;
        };
        for succ in &pb.successors {
            if (succ.index as usize) < num_blocks {
                targets.push(BlockId(succ.index as usize));
            }
        }
    }

    let blocks: Vec<BasicBlock> = successors
        .into_iter()
        .enumerate()
        .map(|(i, targets)| {
            let mut block = BasicBlock::new((i as u32) * 4, 4);
            if i == 0 {
                block = block.entry();
            }
            for target in targets {
                block = block.with_successor(target);
            }
            block
        })
        .collect();

    BinaryFunction::new(vec![name.clone()], name, blocks)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let opts = Opts::from_args();
    let doc = profile_document::load(&opts.profile)
        .with_context(|| format!("loading profile at {}", opts.profile.display()))?;

    let mut ctx = synthetic_binary_context(&doc);
    let mut tables = preprocess_profile(&doc, &mut ctx, &opts.options)?;
    let stats = read_profile(
        &doc,
        &mut ctx,
        &mut tables,
        &opts.options,
        &profattach::NeverInfer,
    );

    info!(matched = stats.total_matched(), "attachment finished");
    println!("{}", stats);
    Ok(())
}
