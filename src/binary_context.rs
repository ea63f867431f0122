//! The consumed-not-owned side of the pipeline: functions recovered from the
//! target binary. Building this from a real object file (disassembling
//! instructions, resolving symbols) is out of scope for this core; this
//! module only provides the data shapes the matcher and propagator read and
//! mutate, plus constructors so tests can build a CFG by hand.

use std::cell::RefCell;
use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use crate::profile_document::types::HashFunction;
use crate::profile_document::Header;

/// Index of a function within a [`BinaryContext`]. Back-references from the
/// profile side are pure lookups by this id, never ownership — mirrors the
/// rest of this crate's convention of index-to-value tables instead of
/// owning pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub usize);

/// Index of a basic block within its owning function's `blocks` (layout
/// order; DFS order is a separate permutation of these same ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target: BlockId,
    pub count: u64,
    pub mispredicted_count: u64,
}

impl Edge {
    pub fn new(target: BlockId) -> Self {
        Self {
            target,
            count: 0,
            mispredicted_count: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub is_entry: bool,
    pub input_offset: u32,
    pub original_size: u32,
    pub num_non_pseudo_instructions: u32,
    pub num_calls: u32,
    pub exec_count: u64,
    pub successors: Vec<Edge>,
    /// The "false"/fallthrough child of a conditional branch, used by the
    /// propagator's pass-through heuristic. `None` for blocks that don't end
    /// in a conditional branch (or have no successors at all).
    pub fallthrough_successor: Option<BlockId>,
}

impl BasicBlock {
    pub fn new(input_offset: u32, original_size: u32) -> Self {
        Self {
            is_entry: false,
            input_offset,
            original_size,
            num_non_pseudo_instructions: 0,
            num_calls: 0,
            exec_count: 0,
            successors: Vec::new(),
            fallthrough_successor: None,
        }
    }

    pub fn entry(mut self) -> Self {
        self.is_entry = true;
        self
    }

    pub fn with_instruction_counts(mut self, non_pseudo: u32, calls: u32) -> Self {
        self.num_non_pseudo_instructions = non_pseudo;
        self.num_calls = calls;
        self
    }

    pub fn with_successor(mut self, target: BlockId) -> Self {
        self.successors.push(Edge::new(target));
        self
    }

    pub fn with_fallthrough(mut self, target: BlockId) -> Self {
        if !self.successors.iter().any(|e| e.target == target) {
            self.successors.push(Edge::new(target));
        }
        self.fallthrough_successor = Some(target);
        self
    }

    pub fn successor_edge(&self, target: BlockId) -> Option<&Edge> {
        self.successors.iter().find(|e| e.target == target)
    }

    pub fn successor_edge_mut(&mut self, target: BlockId) -> Option<&mut Edge> {
        self.successors.iter_mut().find(|e| e.target == target)
    }
}

/// An instruction's kind as seen through the `MIB` capability predicates
/// (`isCall`, `isIndirectCall`, `isIndirectBranch`, `getConditionalTailCall`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    Call,
    IndirectCall,
    IndirectBranch,
    ConditionalTailCall,
    Other,
}

impl InstructionKind {
    pub fn is_call_site(&self) -> bool {
        !matches!(self, InstructionKind::Other)
    }
}

/// One callee observed at an indirect call/branch site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallProfileEntry {
    pub callee: Option<EntrySymbol>,
    pub count: u64,
    pub mispreds: u64,
}

/// A polymorphic key-value annotation bag: values are either scalar counts
/// (set once, duplicates warned and dropped) or append-only lists of
/// `(symbol, count, mispreds)`.
#[derive(Debug, Clone, Default)]
pub struct AnnotationBag {
    scalars: FxHashMap<&'static str, u64>,
    call_profile: Vec<CallProfileEntry>,
}

impl AnnotationBag {
    pub fn has_scalar(&self, key: &str) -> bool {
        self.scalars.contains_key(key)
    }

    pub fn get_scalar(&self, key: &str) -> Option<u64> {
        self.scalars.get(key).copied()
    }

    /// Sets a scalar annotation unless one is already present, in which case
    /// the existing value is kept. Returns `false` on a duplicate write.
    pub fn set_scalar_once(&mut self, key: &'static str, value: u64) -> bool {
        if self.scalars.contains_key(key) {
            false
        } else {
            self.scalars.insert(key, value);
            true
        }
    }

    pub fn push_call_profile(&mut self, entry: CallProfileEntry) {
        self.call_profile.push(entry);
    }

    pub fn call_profile(&self) -> &[CallProfileEntry] {
        &self.call_profile
    }
}

#[derive(Debug, Clone)]
pub struct Instruction {
    /// Byte offset from the function's start.
    pub offset: u32,
    pub kind: InstructionKind,
    pub annotations: AnnotationBag,
}

impl Instruction {
    pub fn new(offset: u32, kind: InstructionKind) -> Self {
        Self {
            offset,
            kind,
            annotations: AnnotationBag::default(),
        }
    }
}

/// The symbol an indirect/direct call site resolves to, disambiguated by
/// entry index for multi-entry functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntrySymbol {
    pub function: FunctionId,
    pub entry_discriminator: u32,
}

/// One row of a function's call-site list — appended unconditionally by the
/// propagator regardless of whether the destination instruction could be
/// validated.
#[derive(Debug, Clone)]
pub struct CallSiteRecord {
    pub callee: Option<EntrySymbol>,
    pub count: u64,
    pub mispreds: u64,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct BinaryFunction {
    pub names: Vec<String>,
    pub demangled_name: String,
    pub blocks: Vec<BasicBlock>,
    dfs_order: Vec<usize>,
    pub instructions: Vec<Instruction>,
    pub execution_count: u64,
    pub raw_branch_count: u64,
    has_profile: bool,
    pub profile_matched: bool,
    ignored: bool,
    call_site_records: Vec<CallSiteRecord>,
    hash_cache: RefCell<Option<(bool, u64)>>,
}

impl BinaryFunction {
    pub fn new(names: Vec<String>, demangled_name: String, blocks: Vec<BasicBlock>) -> Self {
        let dfs_order = compute_dfs_order(&blocks);
        Self {
            names,
            demangled_name,
            blocks,
            dfs_order,
            instructions: Vec::new(),
            execution_count: 0,
            raw_branch_count: 0,
            has_profile: false,
            profile_matched: false,
            ignored: false,
            call_site_records: Vec::new(),
            hash_cache: RefCell::new(None),
        }
    }

    pub fn with_instructions(mut self, instructions: Vec<Instruction>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn size(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get_names(&self) -> &[String] {
        &self.names
    }

    pub fn get_demangled_name(&self) -> &str {
        &self.demangled_name
    }

    pub fn layout_order(&self) -> Vec<BlockId> {
        (0..self.blocks.len()).map(BlockId).collect()
    }

    pub fn dfs(&self) -> Vec<BlockId> {
        self.dfs_order.iter().copied().map(BlockId).collect()
    }

    pub fn get_hash(&self) -> Option<u64> {
        self.hash_cache.borrow().map(|(_, h)| h)
    }

    /// Computes (and memoizes) a CFG-structural fingerprint for this
    /// function over the requested block ordering. The concrete hashing
    /// algorithm a real `std`/`xxh3` choice maps to is an external,
    /// out-of-scope concern (see the glossary); what matters here is that
    /// the fingerprint is stable across calls and sensitive to CFG shape, so
    /// `std` uses `DefaultHasher` (SipHash) and `xxh3` uses the
    /// already-dependency `FxHasher` with a distinct seed, giving the two
    /// variants genuinely different (if equally structural) values.
    pub fn compute_hash(&self, is_dfs: bool, hash_fn: HashFunction) -> u64 {
        if let Some((cached_dfs, h)) = *self.hash_cache.borrow() {
            if cached_dfs == is_dfs {
                return h;
            }
        }
        let order = if is_dfs { self.dfs() } else { self.layout_order() };
        let position = |id: BlockId| order.iter().position(|&o| o == id).unwrap_or(usize::MAX);

        let h = match hash_fn {
            HashFunction::Std => {
                use std::collections::hash_map::DefaultHasher;
                let mut hasher = DefaultHasher::new();
                order.len().hash(&mut hasher);
                for &id in &order {
                    let block = &self.blocks[id.0];
                    block.successors.len().hash(&mut hasher);
                    for e in &block.successors {
                        position(e.target).hash(&mut hasher);
                    }
                }
                hasher.finish()
            }
            HashFunction::Xxh3 => {
                let mut hasher = FxHasher::default();
                0xcbf2_9ce4_8422_2325u64.hash(&mut hasher);
                order.len().hash(&mut hasher);
                for &id in &order {
                    let block = &self.blocks[id.0];
                    block.successors.len().hash(&mut hasher);
                    for e in &block.successors {
                        position(e.target).hash(&mut hasher);
                    }
                }
                hasher.finish()
            }
        };
        *self.hash_cache.borrow_mut() = Some((is_dfs, h));
        h
    }

    pub fn instruction_at_offset(&self, offset: u32) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.offset == offset)
    }

    pub fn instruction_at_offset_mut(&mut self, offset: u32) -> Option<&mut Instruction> {
        self.instructions.iter_mut().find(|i| i.offset == offset)
    }

    /// Resolves the entry symbol for a multi-entry function by
    /// discriminator; discriminator 0 is always the primary name. `self_id`
    /// is the id this function is known by in its owning `BinaryContext`.
    pub fn symbol_for_entry(&self, self_id: FunctionId, discriminator: u32) -> Option<EntrySymbol> {
        let index = discriminator as usize;
        if index < self.names.len().max(1) {
            Some(EntrySymbol {
                function: self_id,
                entry_discriminator: discriminator,
            })
        } else {
            None
        }
    }

    pub fn get_all_call_sites(&self) -> &[CallSiteRecord] {
        &self.call_site_records
    }

    pub fn push_call_site(&mut self, record: CallSiteRecord) {
        self.call_site_records.push(record);
    }

    pub fn set_execution_count(&mut self, count: u64) {
        self.execution_count = count;
    }

    pub fn set_raw_branch_count(&mut self, count: u64) {
        self.raw_branch_count = count;
    }

    pub fn mark_profiled(&mut self, _header: &Header) {
        self.has_profile = true;
    }

    pub fn has_profile(&self) -> bool {
        self.has_profile
    }

    pub fn set_ignored(&mut self, ignored: bool) {
        self.ignored = ignored;
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }
}

fn compute_dfs_order(blocks: &[BasicBlock]) -> Vec<usize> {
    fn visit(id: usize, blocks: &[BasicBlock], visited: &mut [bool], order: &mut Vec<usize>) {
        if visited[id] {
            return;
        }
        visited[id] = true;
        order.push(id);
        for edge in &blocks[id].successors {
            visit(edge.target.0, blocks, visited, order);
        }
    }

    let mut visited = vec![false; blocks.len()];
    let mut order = Vec::with_capacity(blocks.len());
    if !blocks.is_empty() {
        visit(0, blocks, &mut visited, &mut order);
    }
    for i in 0..blocks.len() {
        visit(i, blocks, &mut visited, &mut order);
    }
    order
}

/// Owns the recovered functions for the whole binary. Real construction
/// (disassembly, symbol resolution) is out of scope; this is the surface the
/// matcher and propagator need, plus the lookups `getBinaryDataByName` /
/// `getFunctionForSymbol` would otherwise provide.
#[derive(Debug, Clone, Default)]
pub struct BinaryContext {
    pub functions: Vec<BinaryFunction>,
    name_to_id: FxHashMap<String, FunctionId>,
}

impl BinaryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_function(&mut self, function: BinaryFunction) -> FunctionId {
        let id = FunctionId(self.functions.len());
        for name in &function.names {
            self.name_to_id.insert(name.clone(), id);
        }
        self.functions.push(function);
        id
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> {
        (0..self.functions.len()).map(FunctionId)
    }

    /// `getBinaryDataByName(name) -> getFunctionForSymbol(symbol)` folded
    /// into one lookup, since this crate does not model binary data vs.
    /// function symbols as separate entities.
    pub fn find_function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.name_to_id.get(name).copied()
    }

    pub fn get(&self, id: FunctionId) -> &BinaryFunction {
        &self.functions[id.0]
    }

    pub fn get_mut(&mut self, id: FunctionId) -> &mut BinaryFunction {
        &mut self.functions[id.0]
    }
}
