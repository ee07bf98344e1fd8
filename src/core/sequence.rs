//! Sequence containers: encoded blocks, immutable subject views and query
//! context bookkeeping.

use crate::error::{EngineError, EngineResult};

/// Sentinel byte separating concatenated query contexts. It lies outside
/// both alphabets, so any score lookup against it fails hard and extension
/// can never walk across a context boundary.
pub const SENTINEL: u8 = 0xff;

/// An encoded residue buffer. Queries concatenate all contexts (strands or
/// translation frames) into one block with [`SENTINEL`] bytes between them;
/// subjects hold a single sequence or translation frame.
#[derive(Debug, Clone)]
pub struct SequenceBlock {
    pub data: Vec<u8>,
    /// Translation frame tag (0 for untranslated blocks).
    pub frame: i8,
}

impl SequenceBlock {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, frame: 0 }
    }

    pub fn with_frame(data: Vec<u8>, frame: i8) -> Self {
        Self { data, frame }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An immutable window over a subject frame buffer.
///
/// Chunked scanning and translated frames both hand out views instead of
/// splicing bytes into a shared buffer; the underlying data is never
/// modified, so no restore step exists.
#[derive(Debug, Clone, Copy)]
pub struct SubjectView<'a> {
    data: &'a [u8],
    /// Start of this view within the whole frame buffer. Hit coordinates
    /// produced against the view are re-based by this amount.
    pub offset: usize,
    pub frame: i8,
}

impl<'a> SubjectView<'a> {
    pub fn whole(data: &'a [u8], frame: i8) -> Self {
        Self { data, offset: 0, frame }
    }

    /// A sub-view of `len` residues starting at `start` (view-relative).
    pub fn window(&self, start: usize, len: usize) -> Self {
        let end = (start + len).min(self.data.len());
        Self {
            data: &self.data[start..end],
            offset: self.offset + start,
            frame: self.frame,
        }
    }

    pub fn residues(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One query context: a strand or translation frame of one query.
#[derive(Debug, Clone)]
pub struct ContextInfo {
    /// Start of this context in the concatenated query block.
    pub query_offset: usize,
    pub query_length: usize,
    pub frame: i8,
    /// Effective search space for this context; filled in by parameter
    /// setup once the database length is known.
    pub eff_searchsp: i64,
    /// False when the context has no usable statistics (zero length or an
    /// invalid Karlin block) and must be skipped.
    pub is_valid: bool,
}

/// Context table for the concatenated query block.
#[derive(Debug, Clone)]
pub struct QueryInfo {
    pub contexts: Vec<ContextInfo>,
    pub first_context: usize,
    pub last_context: usize,
}

impl QueryInfo {
    /// Build the table, checking that offsets increase strictly.
    pub fn new(contexts: Vec<ContextInfo>) -> EngineResult<Self> {
        if contexts.is_empty() {
            return Err(EngineError::Configuration("query has no contexts".into()));
        }
        for w in contexts.windows(2) {
            if w[1].query_offset <= w[0].query_offset {
                return Err(EngineError::InternalConsistency(format!(
                    "context offsets not strictly increasing: {} then {}",
                    w[0].query_offset, w[1].query_offset
                )));
            }
        }
        let last = contexts.len() - 1;
        Ok(Self { contexts, first_context: 0, last_context: last })
    }

    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Context containing a concatenated-block offset.
    pub fn context_for_offset(&self, offset: usize) -> usize {
        match self
            .contexts
            .binary_search_by(|c| c.query_offset.cmp(&offset))
        {
            Ok(i) => i,
            Err(i) => i - 1,
        }
    }

    /// Convert a concatenated-block offset to a context-local one.
    pub fn to_context_local(&self, offset: usize) -> (usize, usize) {
        let ctx = self.context_for_offset(offset);
        (ctx, offset - self.contexts[ctx].query_offset)
    }
}

/// Concatenate encoded contexts into one query block with sentinels between
/// and around them, and build the matching [`QueryInfo`].
pub fn concat_query_contexts(contexts: &[(Vec<u8>, i8)]) -> EngineResult<(SequenceBlock, QueryInfo)> {
    let total: usize = contexts.iter().map(|(s, _)| s.len() + 1).sum::<usize>() + 1;
    let mut data = Vec::with_capacity(total);
    let mut infos = Vec::with_capacity(contexts.len());

    data.push(SENTINEL);
    for (seq, frame) in contexts {
        infos.push(ContextInfo {
            query_offset: data.len(),
            query_length: seq.len(),
            frame: *frame,
            eff_searchsp: 0,
            is_valid: !seq.is_empty(),
        });
        data.extend_from_slice(seq);
        data.push(SENTINEL);
    }

    let info = QueryInfo::new(infos)?;
    Ok((SequenceBlock::new(data), info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_places_sentinels_between_contexts() {
        let (block, info) = concat_query_contexts(&[
            (vec![0, 1, 2, 3], 1),
            (vec![3, 2, 1, 0], -1),
        ])
        .unwrap();
        assert_eq!(block.len(), 11);
        assert_eq!(block.data[0], SENTINEL);
        assert_eq!(block.data[5], SENTINEL);
        assert_eq!(block.data[10], SENTINEL);
        assert_eq!(info.contexts[0].query_offset, 1);
        assert_eq!(info.contexts[1].query_offset, 6);
        assert_eq!(info.last_context, 1);
    }

    #[test]
    fn offset_to_context_lookup() {
        let (_, info) = concat_query_contexts(&[
            (vec![0; 10], 1),
            (vec![1; 20], -1),
            (vec![2; 5], 2),
        ])
        .unwrap();
        assert_eq!(info.context_for_offset(1), 0);
        assert_eq!(info.context_for_offset(10), 0);
        assert_eq!(info.context_for_offset(12), 1);
        assert_eq!(info.to_context_local(12), (1, 0));
        assert_eq!(info.to_context_local(33), (2, 0));
    }

    #[test]
    fn subject_windows_rebase_offsets() {
        let data: Vec<u8> = (0..100u8).collect();
        let whole = SubjectView::whole(&data, 0);
        let chunk = whole.window(40, 30);
        assert_eq!(chunk.offset, 40);
        assert_eq!(chunk.len(), 30);
        assert_eq!(chunk.residues()[0], 40);
        let nested = chunk.window(5, 10);
        assert_eq!(nested.offset, 45);
        assert_eq!(nested.residues()[0], 45);
    }

    #[test]
    fn decreasing_offsets_rejected() {
        let bad = vec![
            ContextInfo { query_offset: 5, query_length: 3, frame: 1, eff_searchsp: 0, is_valid: true },
            ContextInfo { query_offset: 5, query_length: 3, frame: -1, eff_searchsp: 0, is_valid: true },
        ];
        assert!(QueryInfo::new(bad).is_err());
    }
}
