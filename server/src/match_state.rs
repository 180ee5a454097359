//! Alliances, mine visibility and the win condition.
//!
//! An alliance is a pair of teams. A team holds at most one partner and has
//! to leave before it can join another. Mine visibility is captured when a
//! mine is laid and never revisited when alliances change afterwards.

use crate::error::AllianceError;
use crate::world::Tile;
use log::info;
use shared::{AllianceSnapshot, Team, NEUTRAL_TEAM};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MineRecord {
    pub owner_team: Team,
    pub visible_to: BTreeSet<Team>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchState {
    partners: BTreeMap<Team, Team>,
    /// Outstanding `(from, to)` requests.
    pending: BTreeSet<(Team, Team)>,
    mines: BTreeMap<Tile, MineRecord>,
    match_ended: bool,
    winning_teams: Vec<Team>,
}

impl MatchState {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_pair(a: Team, b: Team) -> Result<(), AllianceError> {
        if a == NEUTRAL_TEAM || b == NEUTRAL_TEAM {
            return Err(AllianceError::NeutralTeam);
        }
        if a == b {
            return Err(AllianceError::SelfAlliance(a));
        }
        Ok(())
    }

    pub fn request_alliance(&mut self, from: Team, to: Team) -> Result<(), AllianceError> {
        Self::check_pair(from, to)?;
        if self.partners.contains_key(&from) {
            return Err(AllianceError::AlreadyAllied(from));
        }
        if self.partners.contains_key(&to) {
            return Err(AllianceError::AlreadyAllied(to));
        }
        self.pending.insert((from, to));
        Ok(())
    }

    /// `accepter` takes up the request `requester` made earlier.
    pub fn accept_alliance(&mut self, accepter: Team, requester: Team) -> Result<(), AllianceError> {
        Self::check_pair(accepter, requester)?;
        if !self.pending.contains(&(requester, accepter)) {
            return Err(AllianceError::NoPendingRequest {
                from: requester,
                to: accepter,
            });
        }
        for team in [accepter, requester] {
            if self.partners.contains_key(&team) {
                return Err(AllianceError::AlreadyAllied(team));
            }
        }
        let involved = |team: Team| team == accepter || team == requester;
        self.pending.retain(|&(a, b)| !involved(a) && !involved(b));
        self.partners.insert(accepter, requester);
        self.partners.insert(requester, accepter);
        info!("Teams {} and {} formed an alliance", requester, accepter);
        Ok(())
    }

    pub fn cancel_request(&mut self, from: Team, to: Team) -> Result<(), AllianceError> {
        if self.pending.remove(&(from, to)) {
            Ok(())
        } else {
            Err(AllianceError::NoPendingRequest { from, to })
        }
    }

    /// Leaves the current alliance and returns the former partner.
    pub fn leave_alliance(&mut self, team: Team) -> Result<Team, AllianceError> {
        let partner = self
            .partners
            .remove(&team)
            .ok_or(AllianceError::NotAllied(team, team))?;
        self.partners.remove(&partner);
        info!("Team {} left its alliance with team {}", team, partner);
        Ok(partner)
    }

    pub fn break_alliance(&mut self, a: Team, b: Team) -> Result<(), AllianceError> {
        if self.partners.get(&a) != Some(&b) {
            return Err(AllianceError::NotAllied(a, b));
        }
        self.partners.remove(&a);
        self.partners.remove(&b);
        info!("Alliance between teams {} and {} broken", a, b);
        Ok(())
    }

    /// Drops every alliance tie of a team that no longer has players.
    pub fn forget_team(&mut self, team: Team) {
        let _ = self.leave_alliance(team);
        self.pending.retain(|&(a, b)| a != team && b != team);
    }

    pub fn has_pending_request(&self, from: Team, to: Team) -> bool {
        self.pending.contains(&(from, to))
    }

    /// A team counts as allied with itself; the neutral team is allied with nobody.
    pub fn are_teams_allied(&self, a: Team, b: Team) -> bool {
        if a == NEUTRAL_TEAM || b == NEUTRAL_TEAM {
            return false;
        }
        a == b || self.partners.get(&a) == Some(&b)
    }

    pub fn partner_of(&self, team: Team) -> Option<Team> {
        self.partners.get(&team).copied()
    }

    /// The team and its partner, if any, in ascending order.
    pub fn allies_of(&self, team: Team) -> Vec<Team> {
        let mut allies = vec![team];
        allies.extend(self.partner_of(team));
        allies.sort_unstable();
        allies
    }

    pub fn record_mine(&mut self, tile: Tile, owner_team: Team) {
        let visible_to = self.allies_of(owner_team).into_iter().collect();
        self.mines.insert(
            tile,
            MineRecord {
                owner_team,
                visible_to,
            },
        );
    }

    pub fn forget_mine(&mut self, tile: Tile) {
        self.mines.remove(&tile);
    }

    /// Mines without a record (pre-placed on the map) are hidden from everyone.
    pub fn is_mine_visible_to(&self, tile: Tile, team: Team) -> bool {
        self.mines
            .get(&tile)
            .is_some_and(|record| record.visible_to.contains(&team))
    }

    pub fn mine_record(&self, tile: Tile) -> Option<&MineRecord> {
        self.mines.get(&tile)
    }

    /// Ends the match when every owned base sits inside one alliance and no
    /// base is neutral. Returns true only on the call that ended it.
    pub fn evaluate_win(&mut self, base_owners: impl IntoIterator<Item = Team>) -> bool {
        if self.match_ended {
            return false;
        }
        let owners: BTreeSet<Team> = base_owners.into_iter().collect();
        let Some(&first) = owners.iter().next() else {
            return false;
        };
        if owners.contains(&NEUTRAL_TEAM) {
            return false;
        }
        if !owners.iter().all(|&team| self.are_teams_allied(first, team)) {
            return false;
        }
        self.match_ended = true;
        self.winning_teams = self.allies_of(first);
        info!("Match ended, winning teams {:?}", self.winning_teams);
        true
    }

    pub fn is_ended(&self) -> bool {
        self.match_ended
    }

    pub fn winning_teams(&self) -> &[Team] {
        &self.winning_teams
    }

    pub fn alliance_snapshots(&self) -> Vec<AllianceSnapshot> {
        self.partners
            .iter()
            .filter(|(a, b)| a < b)
            .map(|(&a, &b)| AllianceSnapshot { teams: vec![a, b] })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_then_accept_forms_symmetric_alliance() {
        let mut state = MatchState::new();
        state.request_alliance(1, 2).unwrap();
        assert!(!state.are_teams_allied(1, 2));
        state.accept_alliance(2, 1).unwrap();
        assert!(state.are_teams_allied(1, 2));
        assert!(state.are_teams_allied(2, 1));
        assert!(!state.has_pending_request(1, 2));
    }

    #[test]
    fn test_must_leave_before_joining_another() {
        let mut state = MatchState::new();
        state.request_alliance(1, 2).unwrap();
        state.accept_alliance(2, 1).unwrap();

        assert_eq!(state.request_alliance(1, 3), Err(AllianceError::AlreadyAllied(1)));
        assert_eq!(state.request_alliance(3, 2), Err(AllianceError::AlreadyAllied(2)));

        assert_eq!(state.leave_alliance(1), Ok(2));
        assert!(!state.are_teams_allied(2, 1));
        state.request_alliance(1, 3).unwrap();
        state.accept_alliance(3, 1).unwrap();
        assert!(state.are_teams_allied(1, 3));
    }

    #[test]
    fn test_accept_without_request_fails() {
        let mut state = MatchState::new();
        assert_eq!(
            state.accept_alliance(2, 1),
            Err(AllianceError::NoPendingRequest { from: 1, to: 2 })
        );
        assert_eq!(state.request_alliance(1, 1), Err(AllianceError::SelfAlliance(1)));
        assert_eq!(
            state.request_alliance(1, NEUTRAL_TEAM),
            Err(AllianceError::NeutralTeam)
        );
    }

    #[test]
    fn test_cancel_and_break() {
        let mut state = MatchState::new();
        state.request_alliance(1, 2).unwrap();
        state.cancel_request(1, 2).unwrap();
        assert!(state.accept_alliance(2, 1).is_err());

        state.request_alliance(1, 2).unwrap();
        state.accept_alliance(2, 1).unwrap();
        assert!(state.break_alliance(1, 3).is_err());
        state.break_alliance(2, 1).unwrap();
        assert!(!state.are_teams_allied(1, 2));
    }

    #[test]
    fn test_neutral_is_never_allied() {
        let state = MatchState::new();
        assert!(state.are_teams_allied(4, 4));
        assert!(!state.are_teams_allied(NEUTRAL_TEAM, NEUTRAL_TEAM));
    }

    #[test]
    fn test_mine_laid_before_alliance_stays_hidden() {
        let mut state = MatchState::new();
        state.record_mine((5, 5), 1);
        state.request_alliance(1, 2).unwrap();
        state.accept_alliance(2, 1).unwrap();
        assert!(state.is_mine_visible_to((5, 5), 1));
        assert!(!state.is_mine_visible_to((5, 5), 2));
    }

    #[test]
    fn test_mine_laid_during_alliance_survives_break() {
        let mut state = MatchState::new();
        state.request_alliance(1, 2).unwrap();
        state.accept_alliance(2, 1).unwrap();
        state.record_mine((6, 6), 1);
        state.leave_alliance(2).unwrap();
        assert!(state.is_mine_visible_to((6, 6), 2));
        assert!(!state.is_mine_visible_to((6, 6), 3));
    }

    #[test]
    fn test_win_requires_single_alliance_and_no_neutral_bases() {
        let mut state = MatchState::new();
        assert!(!state.evaluate_win(Vec::new()));
        assert!(!state.evaluate_win(vec![1, NEUTRAL_TEAM]));
        assert!(!state.evaluate_win(vec![1, 2]));

        state.request_alliance(1, 2).unwrap();
        state.accept_alliance(2, 1).unwrap();
        assert!(state.evaluate_win(vec![1, 2, 2]));
        assert_eq!(state.winning_teams(), &[1, 2]);
    }

    #[test]
    fn test_win_fires_once() {
        let mut state = MatchState::new();
        assert!(state.evaluate_win(vec![3, 3]));
        assert!(!state.evaluate_win(vec![4]));
        assert!(state.is_ended());
        assert_eq!(state.winning_teams(), &[3]);
    }

    #[test]
    fn test_alliance_snapshots_list_each_pair_once() {
        let mut state = MatchState::new();
        state.request_alliance(4, 1).unwrap();
        state.accept_alliance(1, 4).unwrap();
        assert_eq!(
            state.alliance_snapshots(),
            vec![AllianceSnapshot { teams: vec![1, 4] }]
        );
    }
}
