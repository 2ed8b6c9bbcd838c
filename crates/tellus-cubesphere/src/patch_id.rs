//! Path-string identities for quadtree patches.
//!
//! A patch id is its face prefix followed by one child symbol per
//! subdivision, e.g. `py-cab`. The id alone determines the patch, so the
//! quadtree is never stored.

use std::fmt;
use std::str::FromStr;

use crate::{AddressError, CubeFace};

/// One of the four children produced by bisecting a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildQuadrant {
    /// South-west quadrant, symbol `a`.
    SouthWest,
    /// South-east quadrant, symbol `b`.
    SouthEast,
    /// North-east quadrant, symbol `c`.
    NorthEast,
    /// North-west quadrant, symbol `d`.
    NorthWest,
}

impl ChildQuadrant {
    /// All four quadrants in child-symbol order.
    pub const ALL: [ChildQuadrant; 4] = [
        ChildQuadrant::SouthWest,
        ChildQuadrant::SouthEast,
        ChildQuadrant::NorthEast,
        ChildQuadrant::NorthWest,
    ];

    /// The path symbol appended to a parent id.
    #[must_use]
    pub fn symbol(self) -> char {
        match self {
            ChildQuadrant::SouthWest => 'a',
            ChildQuadrant::SouthEast => 'b',
            ChildQuadrant::NorthEast => 'c',
            ChildQuadrant::NorthWest => 'd',
        }
    }

    /// Parse a path symbol.
    #[must_use]
    pub fn from_symbol(symbol: char) -> Option<ChildQuadrant> {
        match symbol {
            'a' => Some(ChildQuadrant::SouthWest),
            'b' => Some(ChildQuadrant::SouthEast),
            'c' => Some(ChildQuadrant::NorthEast),
            'd' => Some(ChildQuadrant::NorthWest),
            _ => None,
        }
    }

    /// Offset of this quadrant's south-west corner, in units of the child size.
    #[must_use]
    pub fn offset(self) -> (f64, f64) {
        match self {
            ChildQuadrant::SouthWest => (0.0, 0.0),
            ChildQuadrant::SouthEast => (1.0, 0.0),
            ChildQuadrant::NorthEast => (1.0, 1.0),
            ChildQuadrant::NorthWest => (0.0, 1.0),
        }
    }
}

/// A validated patch id.
///
/// Construct with [`PatchId::root`], [`PatchId::child`] or by parsing.
/// Depth is `id.len() - 3`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchId(String);

impl PatchId {
    /// Deepest subdivision accepted. Face-local coordinates stay exact
    /// bisections of `[-1, 1]` well beyond this.
    pub const MAX_DEPTH: usize = 30;

    /// The root id of a face.
    #[must_use]
    pub fn root(face: CubeFace) -> Self {
        Self(face.prefix().to_string())
    }

    /// Parse and validate an id string.
    pub fn parse(id: &str) -> Result<Self, AddressError> {
        if id
            .get(..CubeFace::PREFIX_LEN)
            .and_then(CubeFace::from_prefix)
            .is_none()
        {
            return Err(AddressError::UnknownFace { id: id.to_string() });
        }

        let path = &id[CubeFace::PREFIX_LEN..];
        if let Some((offset, symbol)) = path
            .char_indices()
            .find(|&(_, c)| ChildQuadrant::from_symbol(c).is_none())
        {
            return Err(AddressError::InvalidSymbol {
                id: id.to_string(),
                symbol,
                position: CubeFace::PREFIX_LEN + offset,
            });
        }
        if path.len() > Self::MAX_DEPTH {
            return Err(AddressError::TooDeep {
                id: id.to_string(),
                depth: path.len(),
                max: Self::MAX_DEPTH,
            });
        }
        Ok(Self(id.to_string()))
    }

    /// The full id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The face this patch lives on.
    #[must_use]
    pub fn face(&self) -> CubeFace {
        // Validated on construction.
        CubeFace::from_prefix(&self.0[..CubeFace::PREFIX_LEN]).unwrap_or(CubeFace::PosX)
    }

    /// Subdivision depth (0 for a face root).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len() - CubeFace::PREFIX_LEN
    }

    /// The quadrant path from the face root down to this patch.
    pub fn quadrants(&self) -> impl Iterator<Item = ChildQuadrant> + '_ {
        self.0[CubeFace::PREFIX_LEN..]
            .chars()
            .filter_map(ChildQuadrant::from_symbol)
    }

    /// The id of one child.
    ///
    /// Callers must stop descending at [`MAX_DEPTH`](Self::MAX_DEPTH), as
    /// [`traverse`](crate::traverse) does.
    #[must_use]
    pub fn child(&self, quadrant: ChildQuadrant) -> Self {
        debug_assert!(self.depth() < Self::MAX_DEPTH, "{self} is already at max depth");
        let mut id = String::with_capacity(self.0.len() + 1);
        id.push_str(&self.0);
        id.push(quadrant.symbol());
        Self(id)
    }

    /// The four child ids in symbol order `a, b, c, d`.
    #[must_use]
    pub fn children(&self) -> [Self; 4] {
        ChildQuadrant::ALL.map(|q| self.child(q))
    }

    /// The parent id, or `None` for a face root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.depth() == 0 {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_string()))
        }
    }

    /// Whether `other` is this patch or lies inside it.
    #[must_use]
    pub fn contains(&self, other: &PatchId) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PatchId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for PatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
