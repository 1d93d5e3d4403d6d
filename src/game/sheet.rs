//! Sheet geometry.
//!
//! Three coordinate systems are in play:
//!
//! - **shot** coordinates: relative to the throwing end, the delivery
//!   point is the origin and the stone travels towards +y. Clients only
//!   ever see these.
//! - **sheet** coordinates: the simulator's world, centred between the
//!   two houses. Ends alternate between the two halves of the sheet.
//! - **canonical** sheet coordinates: sheet coordinates folded onto the
//!   half whose house lies at +y, used by every area predicate.
//!
//! All transforms are pure functions of the [`SheetSide`].

use crate::core::vec2::Vector2;

/// Hog line, canonical y (m).
pub const HOG_LINE_Y: f32 = 10.9725;
/// Tee line, canonical y (m).
pub const TEE_LINE_Y: f32 = 17.3735;
/// Back line, canonical y (m).
pub const BACK_LINE_Y: f32 = 19.2025;
/// Hack line, canonical y (m).
pub const HACK_LINE_Y: f32 = 21.0315;
/// Back board, canonical y (m).
pub const BACK_BOARD_Y: f32 = 22.8605;
/// Outer radius of the house (m).
pub const HOUSE_RADIUS: f32 = 1.829;
/// Centre of the house, canonical.
pub const TEE: Vector2 = Vector2::new(0.0, TEE_LINE_Y);

/// Which half of the sheet an end is played towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetSide {
    /// House at +y; sheet and canonical coordinates coincide. Odd ends.
    Canonical,
    /// House at -y; everything is rotated by half a turn. Even ends.
    Mirrored,
}

impl SheetSide {
    /// Side used by end `end`.
    #[inline]
    pub fn for_end(end: u8) -> Self {
        if end % 2 == 0 {
            SheetSide::Mirrored
        } else {
            SheetSide::Canonical
        }
    }

    /// Shot position to sheet position.
    #[inline]
    pub fn to_sheet(self, p: Vector2) -> Vector2 {
        match self {
            SheetSide::Canonical => Vector2::new(p.x, p.y - HACK_LINE_Y),
            SheetSide::Mirrored => Vector2::new(-p.x, -p.y + HACK_LINE_Y),
        }
    }

    /// Sheet position to shot position.
    #[inline]
    pub fn to_shot(self, p: Vector2) -> Vector2 {
        match self {
            SheetSide::Canonical => Vector2::new(p.x, p.y + HACK_LINE_Y),
            SheetSide::Mirrored => Vector2::new(-p.x, -p.y + HACK_LINE_Y),
        }
    }

    /// Shot heading to sheet heading.
    #[inline]
    pub fn angle_to_sheet(self, angle: f32) -> f32 {
        match self {
            SheetSide::Canonical => angle,
            SheetSide::Mirrored => angle + std::f32::consts::PI,
        }
    }

    /// Shot velocity to sheet velocity.
    #[inline]
    pub fn velocity_to_sheet(self, v: Vector2) -> Vector2 {
        match self {
            SheetSide::Canonical => v,
            SheetSide::Mirrored => -v,
        }
    }

    /// Sheet position to canonical sheet position.
    #[inline]
    pub fn canonicalize(self, p: Vector2) -> Vector2 {
        match self {
            SheetSide::Canonical => p,
            SheetSide::Mirrored => -p,
        }
    }
}

// =============================================================================
// AREA PREDICATES (sheet coordinates in, canonical checks)
// =============================================================================

/// Still on the sheet while stones are moving.
///
/// A stone touching the back line still counts as inside.
pub fn is_valid_in_motion(p: Vector2, sheet_width: f32, radius: f32, side: SheetSide) -> bool {
    let c = side.canonicalize(p);
    let half_width = sheet_width / 2.0;
    c.x + radius < half_width
        && c.x - radius > -half_width
        && c.y - radius < BACK_LINE_Y
        && c.y - radius > -BACK_BOARD_Y
}

/// Fully past the hog line once stopped.
pub fn is_in_play_area(p: Vector2, radius: f32, side: SheetSide) -> bool {
    side.canonicalize(p).y - radius > HOG_LINE_Y
}

/// Touching the house.
pub fn is_in_house(p: Vector2, radius: f32, side: SheetSide) -> bool {
    side.canonicalize(p).distance(TEE) < HOUSE_RADIUS + radius
}

/// In the free-guard zone: short of the tee line and not touching the house.
///
/// Hog line and side checks are left to the other predicates.
pub fn is_in_free_guard_zone(p: Vector2, radius: f32, side: SheetSide) -> bool {
    if is_in_house(p, radius, side) {
        return false;
    }
    side.canonicalize(p).y + radius < TEE_LINE_Y
}
