//! Guttman's quadratic split.

use crate::page::Branch;
use crate::rect::{area_distance, Coord, Rect};
use itertools::Itertools;

/// Distributes an overflowing page's branches over two groups.
///
/// The pair wasting the most area when covered together seeds the groups.
/// Then, repeatedly, the branch with the strongest preference for one group
/// (largest difference of enlargements) is assigned to the group it enlarges
/// least, until one group needs every remaining branch to reach `min_fill`.
///
/// Both groups end up with at least `min_fill` branches provided
/// `2 * min_fill <= branches.len()`. Each group starts with its seed.
pub(crate) fn quadratic_split<C: Coord, const D: usize>(
    mut branches: Vec<Branch<C, D>>,
    min_fill: usize,
) -> (Vec<Branch<C, D>>, Vec<Branch<C, D>>) {
    if branches.len() < 2 {
        return (branches, Vec::new());
    }

    let (first, second) = pick_seeds(&branches);
    // second > first, so removing it first keeps `first` valid
    let seed_b = branches.remove(second);
    let seed_a = branches.remove(first);

    let mut groups = [vec![seed_a], vec![seed_b]];
    let mut covers = [seed_a.rect, seed_b.rect];
    let mut remaining = branches;

    while !remaining.is_empty() {
        if let Some(needy) =
            (0..2).find(|&group| groups[group].len() + remaining.len() <= min_fill)
        {
            groups[needy].append(&mut remaining);
            break;
        }

        let (index, d0, d1) = pick_next(&remaining, &covers);
        let branch = remaining.remove(index);
        let target = if d0 < d1 {
            0
        } else if d1 < d0 {
            1
        } else {
            let (area0, area1) = (covers[0].area(), covers[1].area());
            if area0 < area1 {
                0
            } else if area1 < area0 {
                1
            } else if groups[1].len() < groups[0].len() {
                1
            } else {
                0
            }
        };

        covers[target] = covers[target].union(&branch.rect);
        groups[target].push(branch);
    }

    let [kept, moved] = groups;
    (kept, moved)
}

/// Indices `(i, j)`, `i < j`, of the pair maximising
/// `area(union) - area(a) - area(b)`. The first such pair wins ties.
fn pick_seeds<C: Coord, const D: usize>(branches: &[Branch<C, D>]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut best_waste: Option<C::Area> = None;
    for ((i, a), (j, b)) in branches.iter().enumerate().tuple_combinations() {
        let waste = a.rect.union(&b.rect).area() - a.rect.area() - b.rect.area();
        if best_waste.map_or(true, |current| waste > current) {
            best_waste = Some(waste);
            best = (i, j);
        }
    }
    best
}

/// The unassigned branch with the largest `|d0 - d1|`, with its enlargements
/// of both group covers. The first such branch wins ties.
fn pick_next<C: Coord, const D: usize>(
    remaining: &[Branch<C, D>],
    covers: &[Rect<C, D>; 2],
) -> (usize, C::Area, C::Area) {
    let mut best: Option<(usize, C::Area, C::Area, C::Area)> = None;
    for (index, branch) in remaining.iter().enumerate() {
        let d0 = covers[0].enlargement_needed(&branch.rect);
        let d1 = covers[1].enlargement_needed(&branch.rect);
        let preference = area_distance(d0, d1);
        if best.map_or(true, |(_, _, _, current)| preference > current) {
            best = Some((index, d0, d1, preference));
        }
    }
    match best {
        Some((index, d0, d1, _)) => (index, d0, d1),
        None => (0, C::ZERO_AREA, C::ZERO_AREA),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strongbox::Handle;

    fn branches(rects: &[Rect<i32, 2>]) -> Vec<Branch<i32, 2>> {
        rects
            .iter()
            .enumerate()
            .map(|(i, rect)| Branch::new(*rect, Handle::new(i as u64 + 1)))
            .collect()
    }

    fn ids(group: &[Branch<i32, 2>]) -> Vec<u64> {
        group.iter().map(|branch| branch.child.raw()).collect()
    }

    #[test]
    fn seeds_are_the_most_wasteful_pair() {
        let input = branches(&[
            Rect::xy(0, 0, 1, 1),
            Rect::xy(1, 1, 2, 2),
            Rect::xy(100, 100, 101, 101),
            Rect::xy(2, 2, 3, 3),
        ]);
        assert_eq!(pick_seeds(&input), (0, 2));
    }

    #[test]
    fn separates_two_clusters() {
        let input = branches(&[
            Rect::xy(0, 0, 1, 1),
            Rect::xy(100, 100, 101, 101),
            Rect::xy(1, 1, 2, 2),
            Rect::xy(101, 101, 102, 102),
            Rect::xy(2, 0, 3, 1),
        ]);
        let (kept, moved) = quadratic_split(input, 2);
        assert_eq!(ids(&kept), vec![1, 3, 5]);
        assert_eq!(ids(&moved), vec![4, 2]);
    }

    #[test]
    fn identical_rectangles_respect_min_fill() {
        let point = Rect::xy(3, 3, 3, 3);
        let input = branches(&[point; 5]);
        let (kept, moved) = quadratic_split(input, 2);
        assert_eq!(kept.len() + moved.len(), 5);
        assert!(kept.len() >= 2);
        assert!(moved.len() >= 2);
    }

    #[test]
    fn needy_group_takes_the_rest() {
        // everything hugs the first seed; the second group must still reach min_fill
        let input = branches(&[
            Rect::xy(0, 0, 1, 1),
            Rect::xy(1000, 1000, 1001, 1001),
            Rect::xy(0, 0, 1, 1),
            Rect::xy(0, 0, 1, 1),
            Rect::xy(0, 0, 1, 1),
            Rect::xy(0, 0, 1, 1),
        ]);
        let (kept, moved) = quadratic_split(input, 3);
        assert_eq!(kept.len(), 3);
        assert_eq!(moved.len(), 3);
        assert_eq!(moved[0].child, Handle::new(2));
    }

    #[test]
    fn every_branch_is_kept() {
        let input = branches(&[
            Rect::xy(5, 5, 9, 9),
            Rect::xy(0, 0, 3, 3),
            Rect::xy(4, 0, 6, 2),
            Rect::xy(7, 1, 8, 4),
            Rect::xy(1, 6, 2, 9),
        ]);
        let (kept, moved) = quadratic_split(input, 2);
        let mut all: Vec<u64> = ids(&kept).into_iter().chain(ids(&moved)).collect();
        all.sort();
        assert_eq!(all, vec![1, 2, 3, 4, 5]);
    }
}
