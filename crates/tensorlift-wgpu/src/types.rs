/// Reduction applied within each pooling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Max,
    Avg,
}

impl PoolKind {
    pub fn label(&self) -> &'static str {
        match self {
            PoolKind::Max => "max",
            PoolKind::Avg => "avg",
        }
    }
}

/// What a pooling pass writes. A closed set: the variant is chosen once at
/// program construction and selects the generated shader, the binding list
/// and the output dtypes; nothing re-checks it per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolOutput {
    /// One value buffer, same element type as the input.
    Values,
    /// One `i32` buffer of flattened argmax offsets.
    Indices { include_batch: bool },
    /// Value and index buffers produced by a single scan.
    ValuesAndIndices { include_batch: bool },
}

impl PoolOutput {
    pub fn emits_values(&self) -> bool {
        matches!(self, PoolOutput::Values | PoolOutput::ValuesAndIndices { .. })
    }

    pub fn emits_indices(&self) -> bool {
        matches!(
            self,
            PoolOutput::Indices { .. } | PoolOutput::ValuesAndIndices { .. }
        )
    }

    /// Whether index outputs fold the batch coordinate into the flattened
    /// offset. `None` for variants without an index output.
    pub fn include_batch(&self) -> Option<bool> {
        match self {
            PoolOutput::Values => None,
            PoolOutput::Indices { include_batch }
            | PoolOutput::ValuesAndIndices { include_batch } => Some(*include_batch),
        }
    }

    pub fn output_count(&self) -> usize {
        match self {
            PoolOutput::Values | PoolOutput::Indices { .. } => 1,
            PoolOutput::ValuesAndIndices { .. } => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PoolOutput::Values => "values",
            PoolOutput::Indices {
                include_batch: false,
            } => "indices",
            PoolOutput::Indices {
                include_batch: true,
            } => "indices-batched",
            PoolOutput::ValuesAndIndices {
                include_batch: false,
            } => "combined",
            PoolOutput::ValuesAndIndices {
                include_batch: true,
            } => "combined-batched",
        }
    }
}
