use serde::Serialize;

/// Axis-aligned pixel box. `top <= bottom` and `left <= right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

impl Position {
    pub fn new(top: i32, left: i32, bottom: i32, right: i32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// Bounding box of a polygon. Returns `None` for an empty vertex list.
    pub fn from_vertices(vertices: &[Vertex]) -> Option<Self> {
        let mut iter = vertices.iter();
        let first = iter.next()?;
        let start = Position::new(first.y, first.x, first.y, first.x);
        Some(iter.fold(start, |acc, vertex| Position {
            top: acc.top.min(vertex.y),
            left: acc.left.min(vertex.x),
            bottom: acc.bottom.max(vertex.y),
            right: acc.right.max(vertex.x),
        }))
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Integer vertical center, truncated like the pixel grid.
    pub fn middle(&self) -> i32 {
        (self.top + self.bottom) / 2
    }

    pub fn union(&self, other: &Position) -> Position {
        Position {
            top: self.top.min(other.top),
            left: self.left.min(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.max(other.right),
        }
    }

    pub fn horizontally_overlaps(&self, other: &Position) -> bool {
        self.right >= other.left && self.left <= other.right
    }

    /// Grows the box by `padding` on every side and clamps it to `[0, width] x [0, height]`.
    pub fn padded_within(&self, padding: i32, width: i32, height: i32) -> Position {
        Position {
            top: (self.top - padding).max(0),
            left: (self.left - padding).max(0),
            bottom: (self.bottom + padding).min(height),
            right: (self.right + padding).min(width),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Vertex {
    pub x: i32,
    pub y: i32,
}

impl Vertex {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Union of all positions. The union of an empty set is undefined.
pub fn union_all<'a, I>(positions: I) -> Option<Position>
where
    I: IntoIterator<Item = &'a Position>,
{
    let mut iter = positions.into_iter();
    let first = *iter.next()?;
    Some(iter.fold(first, |acc, position| acc.union(position)))
}

/// Merges positions into row regions: a position joins the previous region when
/// it straddles that region's vertical center.
pub fn row_regions(positions: &[Position]) -> Vec<Position> {
    let mut regions: Vec<Position> = Vec::new();
    for position in positions {
        match regions.last_mut() {
            Some(last) if position.top <= last.middle() && position.bottom >= last.middle() => {
                *last = last.union(position);
            }
            _ => regions.push(*position),
        }
    }
    regions
}
