//! Huffman-shaped wavelet tree over one context section.
//!
//! Internal nodes carry a bit vector with one bit per symbol routed through
//! them: 0 descends left, 1 descends right. The shape is Huffman over the
//! section's symbol frequencies, so frequent symbols sit near the root and
//! the total number of vector bits equals the Huffman-weighted length of
//! the section.
//!
//! Shape serialization is a 256-bit alphabet mask followed, for every
//! internal node in pre-order, by one direction bit per covered symbol in
//! ascending symbol order. A section with a single distinct symbol is a
//! lone leaf: the mask alone describes it.

use crate::bitstream::{BitReader, BitWriter};
use crate::error::BwError;
use crate::Result;

/// Child link inside the tree.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Child {
    Internal(usize),
    Leaf(u8),
}

pub struct Node {
    pub left: Child,
    pub right: Child,
    /// Direction bits of the symbols routed through this node, in section
    /// order (filled by `fill`), or in decode order (filled by the coder).
    pub bits: Vec<bool>,
    /// Symbols covered by this node, ascending. Drives shape emission.
    pub symbols: Vec<u8>,
}

pub struct WaveletTree {
    /// Internal nodes; index 0 is the root. Empty for a single-symbol
    /// alphabet, where `lone_symbol` holds the leaf.
    pub nodes: Vec<Node>,
    pub lone_symbol: Option<u8>,
    codes: Vec<Vec<bool>>,
}

impl WaveletTree {
    /// Build the Huffman shape for `freqs` without filling any vectors.
    pub fn from_frequencies(freqs: &[u64; 256]) -> Self {
        let symbols: Vec<u8> = (0..256u32)
            .filter(|&s| freqs[s as usize] > 0)
            .map(|s| s as u8)
            .collect();
        assert!(!symbols.is_empty());
        if symbols.len() == 1 {
            return Self {
                nodes: Vec::new(),
                lone_symbol: Some(symbols[0]),
                codes: vec![Vec::new(); 256],
            };
        }

        // Huffman merge over a minimum heap. The merged node takes the
        // second extraction as its left child and the first as its right,
        // which places the lighter subtree on the right.
        let mut heap = MinimumHeap::new();
        let mut arena: Vec<Node> = Vec::new();
        for &s in &symbols {
            heap.insert(Child::Leaf(s), freqs[s as usize]);
        }
        while heap.len() > 1 {
            let (first, w1) = heap.delete_min();
            let (second, w2) = heap.delete_min();
            arena.push(Node {
                left: second,
                right: first,
                bits: Vec::new(),
                symbols: Vec::new(),
            });
            heap.insert(Child::Internal(arena.len() - 1), w1 + w2);
        }
        let (root, _) = heap.delete_min();

        // Re-index so the root is node 0 and children follow their parent
        // (pre-order), then collect covered symbol lists and codes.
        let mut tree = Self {
            nodes: Vec::new(),
            lone_symbol: None,
            codes: vec![Vec::new(); 256],
        };
        let root = match root {
            Child::Internal(i) => i,
            Child::Leaf(_) => unreachable!("two or more symbols always merge"),
        };
        tree.adopt(&arena, root);
        tree.collect_symbols(0);
        tree.collect_codes(0, &mut Vec::new());
        tree
    }

    fn adopt(&mut self, arena: &[Node], old: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node {
            left: Child::Leaf(0),
            right: Child::Leaf(0),
            bits: Vec::new(),
            symbols: Vec::new(),
        });
        let (old_left, old_right) = (arena[old].left, arena[old].right);
        let left = match old_left {
            Child::Internal(i) => Child::Internal(self.adopt(arena, i)),
            leaf => leaf,
        };
        let right = match old_right {
            Child::Internal(i) => Child::Internal(self.adopt(arena, i)),
            leaf => leaf,
        };
        self.nodes[id].left = left;
        self.nodes[id].right = right;
        id
    }

    fn collect_symbols(&mut self, id: usize) {
        let (left, right) = (self.nodes[id].left, self.nodes[id].right);
        let mut symbols = Vec::new();
        for child in [left, right] {
            match child {
                Child::Leaf(s) => symbols.push(s),
                Child::Internal(i) => {
                    self.collect_symbols(i);
                    symbols.extend_from_slice(&self.nodes[i].symbols);
                }
            }
        }
        symbols.sort_unstable();
        self.nodes[id].symbols = symbols;
    }

    fn collect_codes(&mut self, id: usize, path: &mut Vec<bool>) {
        let (left, right) = (self.nodes[id].left, self.nodes[id].right);
        for (bit, child) in [(false, left), (true, right)] {
            path.push(bit);
            match child {
                Child::Leaf(s) => self.codes[s as usize] = path.clone(),
                Child::Internal(i) => self.collect_codes(i, path),
            }
            path.pop();
        }
    }

    /// Code (root-to-leaf directions) of `symbol`.
    pub fn code(&self, symbol: u8) -> &[bool] {
        &self.codes[symbol as usize]
    }

    /// Route every symbol of `section` through the tree, appending one bit
    /// to each visited internal node.
    pub fn fill(&mut self, section: &[u8]) {
        if self.lone_symbol.is_some() {
            return;
        }
        for &sym in section {
            let mut id = 0usize;
            loop {
                let bit = {
                    let node = &self.nodes[id];
                    match node.left {
                        Child::Leaf(s) if s == sym => false,
                        Child::Internal(i) if self.nodes[i].symbols.binary_search(&sym).is_ok() => {
                            false
                        }
                        _ => true,
                    }
                };
                self.nodes[id].bits.push(bit);
                let next = if bit {
                    self.nodes[id].right
                } else {
                    self.nodes[id].left
                };
                match next {
                    Child::Leaf(_) => break,
                    Child::Internal(i) => id = i,
                }
            }
        }
    }

    /// Bits stored in the root vector (the section length).
    pub fn bits_in_root(&self) -> usize {
        match self.lone_symbol {
            Some(_) => 0,
            None => self.nodes[0].bits.len(),
        }
    }

    /// Total bits over all internal nodes.
    pub fn total_bits(&self) -> usize {
        self.nodes.iter().map(|n| n.bits.len()).sum()
    }

    /// Serialize the shape: alphabet mask, then pre-order direction bits.
    pub fn write_shape(&self, bw: &mut BitWriter) {
        let occurs: Vec<bool> = match self.lone_symbol {
            Some(s) => (0..256).map(|i| i == s as usize).collect(),
            None => {
                let root = &self.nodes[0].symbols;
                (0..256).map(|i| root.binary_search(&(i as u8)).is_ok()).collect()
            }
        };
        for bit in occurs {
            bw.push_bit(bit);
        }
        if self.lone_symbol.is_none() {
            self.write_node_shape(0, bw);
        }
    }

    fn write_node_shape(&self, id: usize, bw: &mut BitWriter) {
        let node = &self.nodes[id];
        let depth = self.depth_of(id);
        for &s in &node.symbols {
            bw.push_bit(self.codes[s as usize][depth]);
        }
        if let Child::Internal(i) = node.left {
            self.write_node_shape(i, bw);
        }
        if let Child::Internal(i) = node.right {
            self.write_node_shape(i, bw);
        }
    }

    fn depth_of(&self, id: usize) -> usize {
        // Depth equals the code length consumed above this node; derive it
        // from any covered symbol by walking from the root.
        let mut depth = 0;
        let mut cur = 0usize;
        while cur != id {
            let sym = self.nodes[id].symbols[0];
            let bit = self.codes[sym as usize][depth];
            cur = match if bit { self.nodes[cur].right } else { self.nodes[cur].left } {
                Child::Internal(i) => i,
                Child::Leaf(_) => unreachable!("walk ended before target node"),
            };
            depth += 1;
        }
        depth
    }

    /// Read a shape produced by `write_shape`, rebuilding nodes (with empty
    /// bit vectors) and codes.
    pub fn read_shape(reader: &mut BitReader<'_>) -> Result<Self> {
        let mut symbols = Vec::new();
        for s in 0..256u32 {
            if reader.read_bit()? {
                symbols.push(s as u8);
            }
        }
        if symbols.is_empty() {
            return Err(BwError::MalformedInput("empty wavelet alphabet"));
        }
        let mut tree = Self {
            nodes: Vec::new(),
            lone_symbol: None,
            codes: vec![Vec::new(); 256],
        };
        if symbols.len() == 1 {
            tree.lone_symbol = Some(symbols[0]);
            return Ok(tree);
        }
        tree.read_node(reader, symbols)?;
        tree.collect_codes(0, &mut Vec::new());
        Ok(tree)
    }

    fn read_node(&mut self, reader: &mut BitReader<'_>, symbols: Vec<u8>) -> Result<usize> {
        debug_assert!(symbols.len() >= 2);
        let id = self.nodes.len();
        self.nodes.push(Node {
            left: Child::Leaf(0),
            right: Child::Leaf(0),
            bits: Vec::new(),
            symbols: symbols.clone(),
        });
        let mut left_syms = Vec::new();
        let mut right_syms = Vec::new();
        for &s in &symbols {
            if reader.read_bit()? {
                right_syms.push(s);
            } else {
                left_syms.push(s);
            }
        }
        if left_syms.is_empty() || right_syms.is_empty() {
            return Err(BwError::MalformedInput("degenerate wavelet shape"));
        }
        let left = if left_syms.len() == 1 {
            Child::Leaf(left_syms[0])
        } else {
            Child::Internal(self.read_node(reader, left_syms)?)
        };
        let right = if right_syms.len() == 1 {
            Child::Leaf(right_syms[0])
        } else {
            Child::Internal(self.read_node(reader, right_syms)?)
        };
        self.nodes[id].left = left;
        self.nodes[id].right = right;
        Ok(id)
    }

    /// Rebuild the section from filled bit vectors. `len` is the expected
    /// number of symbols.
    pub fn message(&self, len: usize, out: &mut Vec<u8>) -> Result<()> {
        if let Some(s) = self.lone_symbol {
            out.extend(std::iter::repeat(s).take(len));
            return Ok(());
        }
        let mut cursors = vec![0usize; self.nodes.len()];
        for _ in 0..len {
            let mut id = 0usize;
            loop {
                let node = &self.nodes[id];
                if cursors[id] >= node.bits.len() {
                    return Err(BwError::MalformedInput("wavelet vector exhausted"));
                }
                let bit = node.bits[cursors[id]];
                cursors[id] += 1;
                match if bit { node.right } else { node.left } {
                    Child::Leaf(s) => {
                        out.push(s);
                        break;
                    }
                    Child::Internal(i) => id = i,
                }
            }
        }
        Ok(())
    }
}

/// Small array-backed minimum heap keyed by priority; payload kept beside.
pub struct MinimumHeap<T> {
    items: Vec<(T, u64)>,
}

impl<T: Copy> MinimumHeap<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn insert(&mut self, value: T, priority: u64) {
        self.items.push((value, priority));
        let mut i = self.items.len() - 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.items[parent].1 <= self.items[i].1 {
                break;
            }
            self.items.swap(parent, i);
            i = parent;
        }
    }

    pub fn delete_min(&mut self) -> (T, u64) {
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let min = self.items.pop().expect("delete_min on empty heap");
        let mut i = 0;
        loop {
            let (l, r) = (2 * i + 1, 2 * i + 2);
            let mut smallest = i;
            if l < self.items.len() && self.items[l].1 < self.items[smallest].1 {
                smallest = l;
            }
            if r < self.items.len() && self.items[r].1 < self.items[smallest].1 {
                smallest = r;
            }
            if smallest == i {
                break;
            }
            self.items.swap(i, smallest);
            i = smallest;
        }
        min
    }
}

impl<T: Copy> Default for MinimumHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}
