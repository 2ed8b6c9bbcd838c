//! Addressing error types.

/// Errors raised at the addressing boundary: malformed patch ids and
/// grid indices outside a patch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The id does not start with one of the six face prefixes.
    #[error("patch id {id:?} does not start with a face prefix (px-, nx-, py-, ny-, pz-, nz-)")]
    UnknownFace {
        /// The rejected id.
        id: String,
    },

    /// The id contains a subdivision symbol other than `a`-`d`.
    #[error("patch id {id:?} has invalid subdivision symbol {symbol:?} at position {position}")]
    InvalidSymbol {
        /// The rejected id.
        id: String,
        /// The offending character.
        symbol: char,
        /// Byte offset of the offending character.
        position: usize,
    },

    /// The id subdivides deeper than face-local doubles can bisect exactly.
    #[error("patch id {id:?} is {depth} levels deep, maximum is {max}")]
    TooDeep {
        /// The rejected id.
        id: String,
        /// Depth implied by the id.
        depth: usize,
        /// Maximum supported depth.
        max: usize,
    },

    /// A grid sample index lies outside the patch's `[0, resolution)` grid.
    #[error("grid index ({i}, {j}) outside a {resolution}x{resolution} patch grid")]
    GridIndexOutOfRange {
        /// Sample column.
        i: usize,
        /// Sample row.
        j: usize,
        /// Grid resolution.
        resolution: usize,
    },
}
