//! Household role inference (CHILD / SINGLE / MARRIED).
//!
//! Roles are recomputed from age, gender and the survey relationship code
//! only, so classifying the same household twice with the same stream
//! yields the same roles.
//!
//! Matching heuristic for multi-person households: children are taken out
//! first, the remaining adults are split by gender, and the smaller side is
//! paired against the larger one. Each pairing takes the closest-age
//! partner still available and is accepted with probability
//! `max(0, gap - |age diff|) / scale`. A rejected pairing leaves both
//! people SINGLE, as does being left over on the larger side.

use crate::{
    config::RelationshipConfig,
    microdata::{Gender, RelationshipCode},
    population::{Population, Role, SyntheticPerson},
    rng::RandomSource,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipStats {
    pub households: u64,
    pub children: u64,
    pub singles: u64,
    pub married: u64,
    pub pairings_accepted: u64,
    pub pairings_rejected: u64,
    /// Members no rule reached; resolved to SINGLE by the final sweep.
    pub unresolved: u64,
}

impl RelationshipStats {
    fn absorb(&mut self, other: &RelationshipStats) {
        self.households += other.households;
        self.children += other.children;
        self.singles += other.singles;
        self.married += other.married;
        self.pairings_accepted += other.pairings_accepted;
        self.pairings_rejected += other.pairings_rejected;
        self.unresolved += other.unresolved;
    }
}

pub struct RelationshipClassifier {
    config: RelationshipConfig,
}

impl RelationshipClassifier {
    pub fn new(config: RelationshipConfig) -> Self {
        Self { config }
    }

    /// Classify every household in draw order.
    pub fn classify<R: RandomSource>(
        &self,
        population: &mut Population,
        rng: &mut R,
    ) -> RelationshipStats {
        let mut stats = RelationshipStats::default();
        for household in &mut population.households {
            let household_stats = self.classify_household(&mut household.persons, rng);
            stats.absorb(&household_stats);
        }
        if stats.unresolved > 0 {
            log::warn!(
                "relationship: {} members matched no rule and were set SINGLE",
                stats.unresolved
            );
        }
        stats
    }

    /// Assign a role to every member of one household.
    pub fn classify_household<R: RandomSource>(
        &self,
        persons: &mut [SyntheticPerson],
        rng: &mut R,
    ) -> RelationshipStats {
        let mut stats = RelationshipStats {
            households: 1,
            ..Default::default()
        };
        for p in persons.iter_mut() {
            p.role = None;
        }

        if persons.len() == 1 {
            persons[0].role = Some(Role::Single);
        } else if persons.len() > 1 {
            let mut males = Vec::new();
            let mut females = Vec::new();
            for (i, p) in persons.iter_mut().enumerate() {
                if self.is_child(p) {
                    p.role = Some(Role::Child);
                } else {
                    match p.gender {
                        Gender::Male => males.push(i),
                        Gender::Female => females.push(i),
                    }
                }
            }

            if !males.is_empty() || !females.is_empty() {
                match males.len().cmp(&females.len()) {
                    Ordering::Equal => self.pair_off(persons, &males, females, rng, &mut stats),
                    Ordering::Less if males.is_empty() => set_roles(persons, &females, Role::Single),
                    Ordering::Less => self.pair_off(persons, &males, females, rng, &mut stats),
                    Ordering::Greater if females.is_empty() => {
                        set_roles(persons, &males, Role::Single)
                    }
                    Ordering::Greater => self.pair_off(persons, &females, males, rng, &mut stats),
                }
            }
        }

        for p in persons.iter_mut() {
            match p.role {
                Some(Role::Child) => stats.children += 1,
                Some(Role::Single) => stats.singles += 1,
                Some(Role::Married) => stats.married += 1,
                None => {
                    p.role = Some(Role::Single);
                    stats.singles += 1;
                    stats.unresolved += 1;
                }
            }
        }
        stats
    }

    fn is_child(&self, person: &SyntheticPerson) -> bool {
        person.relationship == RelationshipCode::Child
            || person.age < self.config.child_age_threshold
    }

    /// Pair each `minority` member with the closest-age member left in
    /// `majority`. Leftovers on the majority side become SINGLE.
    fn pair_off<R: RandomSource>(
        &self,
        persons: &mut [SyntheticPerson],
        minority: &[usize],
        mut majority: Vec<usize>,
        rng: &mut R,
        stats: &mut RelationshipStats,
    ) {
        for &a in minority {
            let closest = majority
                .iter()
                .enumerate()
                .map(|(pos, &b)| (pos, persons[a].age.abs_diff(persons[b].age)))
                .min_by_key(|(_, diff)| *diff);
            let Some((pos, diff)) = closest else {
                persons[a].role = Some(Role::Single);
                continue;
            };
            let b = majority.remove(pos);

            let p = self.marriage_probability(diff as f64);
            if rng.chance(p) {
                persons[a].role = Some(Role::Married);
                persons[b].role = Some(Role::Married);
                stats.pairings_accepted += 1;
            } else {
                persons[a].role = Some(Role::Single);
                persons[b].role = Some(Role::Single);
                stats.pairings_rejected += 1;
            }
        }
        set_roles(persons, &majority, Role::Single);
    }

    /// Linear decay to zero at `marriage_age_gap`. Values above 1 mean the
    /// pairing is always accepted.
    pub fn marriage_probability(&self, age_diff: f64) -> f64 {
        (self.config.marriage_age_gap - age_diff).max(0.0) / self.config.marriage_acceptance_scale
    }
}

fn set_roles(persons: &mut [SyntheticPerson], members: &[usize], role: Role) {
    for &i in members {
        persons[i].role = Some(role);
    }
}
