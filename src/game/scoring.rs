//! End scoring.

use crate::core::stone::{AllStoneData, STONE_MAX};
use super::sheet::{SheetSide, HOUSE_RADIUS, TEE};
use super::state::TeamId;

/// Score of a finished end, positive for team 0.
///
/// Stone `i` belongs to team `(i + first) % 2`. The team with the stone
/// nearest the tee scores one point per stone strictly nearer than the
/// opponent's nearest stone. Stones outside the house never count because
/// each team's nearest distance starts at the house edge.
pub fn check_score(
    stones: &AllStoneData,
    stone_radius: f32,
    side: SheetSide,
    first: TeamId,
) -> i8 {
    let mut distances = [f32::MAX; STONE_MAX];
    for (d, stone) in distances.iter_mut().zip(stones.iter()) {
        if let Some(stone) = stone {
            *d = side.canonicalize(stone.position).distance(TEE);
        }
    }

    let team_of = |i: usize| TeamId::from_index(i + first.index());

    let mut nearest = [HOUSE_RADIUS + stone_radius; 2];
    for (i, &d) in distances.iter().enumerate() {
        let team = team_of(i).index();
        if d < nearest[team] {
            nearest[team] = d;
        }
    }

    let (scorer, sign) = if nearest[0] < nearest[1] {
        (TeamId::Team0, 1)
    } else {
        (TeamId::Team1, -1)
    };
    let bar = nearest[scorer.opponent().index()];

    let count = distances
        .iter()
        .enumerate()
        .filter(|&(i, &d)| team_of(i) == scorer && d < bar)
        .count() as i8;

    sign * count
}
