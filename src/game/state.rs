use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::board::{Board, Character, Coord, Side, MAX_CHARACTERS_PER_SIDE};
use super::cards::{default_deck, generate_opponent_deck, Card};
use super::effects::{EffectChain, Move, Step, VisibleEffect};

const DEFAULT_MAX_TURNS: u32 = 20;
const DEFAULT_KNOCKOUT_PENALTY: i32 = 3;
const DEFAULT_STARTING_DEFENSE: i32 = 5;
const DEFAULT_REBOUND_DEFENSE: i32 = 5;
const SAMPLE_SEED: u64 = 0x5EED;

/// 对局规则参数。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RulesConfig {
    pub max_turns: u32,
    pub knockout_penalty: i32,
    pub starting_defense: i32,
    pub rebound_defense: i32,
    pub draw_per_turn: u8,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            knockout_penalty: DEFAULT_KNOCKOUT_PENALTY,
            starting_defense: DEFAULT_STARTING_DEFENSE,
            rebound_defense: DEFAULT_REBOUND_DEFENSE,
            draw_per_turn: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameMode {
    /// 本地玩家操作 Home，电脑操作 Away。
    Solo,
    /// 双方轮流在同一设备上操作。
    Hotseat,
    /// 联机：本端只操作 `local` 一方，另一方通过快照同步。
    Online { local: Side },
}

impl Default for GameMode {
    fn default() -> Self {
        GameMode::Solo
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Controller {
    Local,
    Ai,
    Remote,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    /// 等待开始第一个回合。
    Setup,
    /// 当前方可以选择角色、卡牌与目标。
    Main,
    /// 有效果链正在结算，拒绝一切输入。
    Resolving,
    Finished,
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Setup
    }
}

/// 多步输入过程中的临时选择，每次行动或回合切换时清空。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<Coord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Coord>,
}

impl Selection {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum VictoryReason {
    Elimination { loser: Side },
    TurnLimit { home_score: i32, away_score: i32 },
}

/// 对局结果；`winner` 为空表示平局。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VictoryState {
    pub winner: Option<Side>,
    pub reason: VictoryReason,
}

impl VictoryState {
    pub fn headline(&self) -> String {
        let how = match self.reason {
            VictoryReason::Elimination { .. } => "Knockout",
            VictoryReason::TurnLimit { .. } => "Position",
        };
        match self.winner {
            Some(Side::Home) => format!("Home Wins by {how}!"),
            Some(Side::Away) => format!("Away Wins by {how}!"),
            None => "Draw!".to_string(),
        }
    }
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    TurnStarted {
        side: Side,
        turn: u32,
    },
    TurnEnded {
        side: Side,
    },
    CharacterSelected {
        coord: Coord,
    },
    CardSelected {
        side: Side,
        index: usize,
        card: Card,
    },
    TargetSelected {
        coord: Coord,
    },
    CardPlayed {
        side: Side,
        actor: Coord,
        card: Card,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        targets: Vec<Coord>,
    },
    CardDiscarded {
        side: Side,
        card: Card,
    },
    CardDrawn {
        side: Side,
        card: Card,
    },
    DeckReshuffled {
        size: usize,
    },
    DamageApplied {
        target: Coord,
        amount: i32,
        defense: i32,
    },
    AttackDeflected {
        target: Coord,
        amount: i32,
    },
    AttackCountered {
        target: Coord,
        amount: i32,
    },
    CharacterUpdated {
        coord: Coord,
        character: Character,
    },
    PushedBack {
        from: Coord,
        to: Coord,
        character: Character,
    },
    KnockedOut {
        coord: Coord,
        knockouts: u32,
    },
    ZoneAdvanced {
        side: Side,
        moves: Vec<Move>,
    },
    NoticeShown {
        text: String,
    },
    GameEnded {
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<Side>,
        reason: VictoryReason,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    TooManyCharacters { side: Side, count: usize },
    DuplicateTeam { side: Side },
    NegativeDefense { coord: Coord, value: i32 },
    SelectionOutOfRange { index: usize },
}

/// 游戏整体状态，也是联机同步使用的快照。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    #[serde(default)]
    pub mode: GameMode,
    #[serde(default)]
    pub config: RulesConfig,
    pub board: Board,
    pub hands: [Vec<Card>; 2],
    #[serde(default)]
    pub deck: Vec<Card>,
    #[serde(default)]
    pub library: Vec<Card>,
    pub active_side: Side,
    pub phase: GamePhase,
    #[serde(default)]
    pub turns_taken: [u32; 2],
    #[serde(default)]
    pub knockouts: [u32; 2],
    #[serde(default)]
    pub selection: Selection,
    #[serde(default)]
    pub chain: EffectChain,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub draws: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VictoryState>,
}

impl GameState {
    pub fn new(mode: GameMode, home_deck: Vec<Card>, away_deck: Vec<Card>) -> Self {
        Self::with_config(mode, home_deck, away_deck, RulesConfig::default())
    }

    pub fn with_config(
        mode: GameMode,
        home_deck: Vec<Card>,
        away_deck: Vec<Card>,
        config: RulesConfig,
    ) -> Self {
        Self {
            mode,
            config,
            board: Board::starting(config.starting_defense),
            deck: home_deck.clone(),
            library: home_deck.clone(),
            hands: [home_deck, away_deck],
            active_side: Side::Home,
            phase: GamePhase::Setup,
            turns_taken: [0, 0],
            knockouts: [0, 0],
            selection: Selection::default(),
            chain: EffectChain::default(),
            seed: 0,
            draws: 0,
            event_log: Vec::new(),
            outcome: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// 按模式准备新对局：单人模式下电脑方使用随机生成的牌组。
    pub fn for_mode(mode: GameMode, deck: Vec<Card>, seed: u64) -> Self {
        let away_deck = match mode {
            GameMode::Solo => generate_opponent_deck(&mut SmallRng::seed_from_u64(seed)),
            GameMode::Hotseat | GameMode::Online { .. } => deck.clone(),
        };
        Self::new(mode, deck, away_deck).with_seed(seed)
    }

    pub fn sample() -> Self {
        Self::for_mode(GameMode::Solo, default_deck(), SAMPLE_SEED)
    }

    pub fn controller(&self, side: Side) -> Controller {
        match (self.mode, side) {
            (GameMode::Solo, Side::Home) | (GameMode::Hotseat, _) => Controller::Local,
            (GameMode::Solo, Side::Away) => Controller::Ai,
            (GameMode::Online { local }, side) if local == side => Controller::Local,
            (GameMode::Online { .. }, _) => Controller::Remote,
        }
    }

    pub fn hand(&self, side: Side) -> &[Card] {
        &self.hands[side.index()]
    }

    pub fn hand_mut(&mut self, side: Side) -> &mut Vec<Card> {
        &mut self.hands[side.index()]
    }

    pub fn turns_taken(&self, side: Side) -> u32 {
        self.turns_taken[side.index()]
    }

    pub fn knockouts(&self, side: Side) -> u32 {
        self.knockouts[side.index()]
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// 从公共牌库随机抽一张；牌库耗尽时用完整牌表整体替换。
    pub fn draw_card(&mut self, side: Side) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if self.deck.is_empty() {
            self.deck = self.library.clone();
            events.push(GameEvent::DeckReshuffled {
                size: self.deck.len(),
            });
        }
        if self.deck.is_empty() {
            return events;
        }

        let mut rng = SmallRng::seed_from_u64(self.seed ^ self.draws.wrapping_mul(0x9E37_79B9));
        self.draws += 1;
        let index = rng.gen_range(0..self.deck.len());
        let card = self.deck.remove(index);
        self.hand_mut(side).push(card);
        events.push(GameEvent::CardDrawn { side, card });
        events
    }

    /// 当前方手里是否有可以打出的牌。
    pub fn has_playable_card(&self, side: Side) -> bool {
        let hand = self.hand(side);
        if hand.iter().any(|card| !card.requires_target()) {
            return true;
        }
        !hand.is_empty() && !self.board.targetable(side.opponent()).is_empty()
    }

    /// 回合开始：清空选择、递减敏捷、按配置抽牌。
    /// 无牌可出时排入提示与结束回合两步。
    pub fn open_turn(&mut self, side: Side) -> Vec<GameEvent> {
        let mut events = Vec::new();
        self.active_side = side;
        self.selection.clear();
        self.phase = GamePhase::Main;

        for (coord, _) in self.board.occupants(side) {
            if let Some(character) = self.board.get_mut(coord) {
                character.agility_turns = character.agility_turns.saturating_sub(1);
            }
        }

        for _ in 0..self.config.draw_per_turn {
            events.extend(self.draw_card(side));
        }

        let turn = self.turns_taken(side) + 1;
        crate::console_log!("[zones] {:?} turn {}", side, turn);
        events.push(GameEvent::TurnStarted { side, turn });

        if !self.has_playable_card(side) {
            self.chain.push_back(Step::Present {
                effect: VisibleEffect::Banner {
                    text: "No valid cards to play!".to_string(),
                },
            });
            self.chain.push_back(Step::EndTurn);
            self.phase = GamePhase::Resolving;
        }

        for event in &events {
            self.record_event(event.clone());
        }
        events
    }

    /// 回合结束：清除当前方未用掉的临时攻击加成并计数。
    pub fn close_turn(&mut self) -> GameEvent {
        let side = self.active_side;
        for (coord, _) in self.board.occupants(side) {
            if let Some(character) = self.board.get_mut(coord) {
                character.temp_attack_bonus = 0;
            }
        }
        self.turns_taken[side.index()] += 1;
        self.selection.clear();
        crate::console_log!("[zones] {:?} ends turn", side);
        let event = GameEvent::TurnEnded { side };
        self.record_event(event.clone());
        event
    }

    /// 每方得分：存活角色相对出发线前进的格数之和，减去被击出场外的惩罚。
    pub fn positional_scores(&self) -> (i32, i32) {
        let score = |side: Side| -> i32 {
            let advanced: i32 = self
                .board
                .occupants(side)
                .iter()
                .map(|(coord, _)| side.zones_advanced(coord.zone))
                .sum();
            advanced - self.config.knockout_penalty * self.knockouts(side) as i32
        };
        (score(Side::Home), score(Side::Away))
    }

    pub fn evaluate_victory(&mut self) -> Option<VictoryState> {
        if let Some(outcome) = &self.outcome {
            return Some(outcome.clone());
        }

        let home = self.board.count(Side::Home);
        let away = self.board.count(Side::Away);
        let victory = if home == 0 || away == 0 {
            let loser = if home == 0 { Side::Home } else { Side::Away };
            VictoryState {
                winner: Some(loser.opponent()),
                reason: VictoryReason::Elimination { loser },
            }
        } else if self.turns_taken(Side::Home) >= self.config.max_turns
            && self.turns_taken(Side::Away) >= self.config.max_turns
        {
            let (home_score, away_score) = self.positional_scores();
            let winner = match home_score.cmp(&away_score) {
                std::cmp::Ordering::Greater => Some(Side::Home),
                std::cmp::Ordering::Less => Some(Side::Away),
                std::cmp::Ordering::Equal => None,
            };
            VictoryState {
                winner,
                reason: VictoryReason::TurnLimit {
                    home_score,
                    away_score,
                },
            }
        } else {
            return None;
        };

        Some(self.declare_victory(victory))
    }

    pub fn declare_victory(&mut self, victory: VictoryState) -> VictoryState {
        if self.outcome.is_none() {
            self.record_event(GameEvent::GameEnded {
                winner: victory.winner,
                reason: victory.reason.clone(),
            });
            self.outcome = Some(victory.clone());
            self.phase = GamePhase::Finished;
            self.selection.clear();
        }
        victory
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        for side in Side::ALL {
            let occupants = self.board.occupants(side);
            if occupants.len() > MAX_CHARACTERS_PER_SIDE {
                return Err(IntegrityError::TooManyCharacters {
                    side,
                    count: occupants.len(),
                });
            }

            let mut seen = HashSet::new();
            for (coord, character) in &occupants {
                if !seen.insert(character.team) {
                    return Err(IntegrityError::DuplicateTeam { side });
                }
                if character.defense < 0 {
                    return Err(IntegrityError::NegativeDefense {
                        coord: *coord,
                        value: character.defense,
                    });
                }
            }
        }

        if let Some(index) = self.selection.card {
            if index >= self.hand(self.active_side).len() {
                return Err(IntegrityError::SelectionOutOfRange { index });
            }
        }

        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(GameMode::default(), default_deck(), default_deck())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Team;

    fn place(state: &mut GameState, side: Side, zone: u8, lane: u8) {
        let team = Team::ALL[usize::from(lane)];
        state
            .board
            .set(Coord::new(side, zone, lane), Some(Character::new(team, 5)));
    }

    #[test]
    fn elimination_declares_other_side() {
        let mut state = GameState::sample();
        for (coord, _) in state.board.occupants(Side::Away) {
            state.board.take(coord);
        }
        let outcome = state.evaluate_victory().expect("game should be over");
        assert_eq!(outcome.winner, Some(Side::Home));
        assert_eq!(outcome.reason, VictoryReason::Elimination { loser: Side::Away });
        assert_eq!(state.phase, GamePhase::Finished);
    }

    #[test]
    fn turn_limit_scores_by_position() {
        let mut state = GameState::sample();
        state.board = Board::empty();
        place(&mut state, Side::Home, 3, 0);
        place(&mut state, Side::Away, 3, 1);
        state.turns_taken = [20, 20];

        assert_eq!(state.positional_scores(), (0, 1));
        let outcome = state.evaluate_victory().expect("turn limit reached");
        assert_eq!(outcome.winner, Some(Side::Away));
        assert_eq!(
            outcome.reason,
            VictoryReason::TurnLimit {
                home_score: 0,
                away_score: 1
            }
        );
    }

    #[test]
    fn knockouts_cost_three_points_each() {
        let mut state = GameState::sample();
        state.board = Board::empty();
        place(&mut state, Side::Home, 1, 0);
        place(&mut state, Side::Away, 2, 1);
        state.knockouts = [1, 0];
        state.turns_taken = [20, 20];

        assert_eq!(state.positional_scores(), (-1, 0));
        let outcome = state.evaluate_victory().expect("turn limit reached");
        assert_eq!(outcome.winner, Some(Side::Away));
    }

    #[test]
    fn equal_scores_draw() {
        let mut state = GameState::sample();
        state.turns_taken = [20, 20];
        let outcome = state.evaluate_victory().expect("turn limit reached");
        assert_eq!(outcome.winner, None);
        assert_eq!(outcome.headline(), "Draw!");
    }

    #[test]
    fn no_result_before_both_sides_reach_limit() {
        let mut state = GameState::sample();
        state.turns_taken = [20, 19];
        assert!(state.evaluate_victory().is_none());
        assert!(!state.is_finished());
    }

    #[test]
    fn draw_refills_exhausted_deck() {
        let mut state = GameState::sample().with_seed(3);
        state.deck.clear();
        let before = state.hand(Side::Home).len();
        let events = state.draw_card(Side::Home);
        assert!(matches!(events.first(), Some(GameEvent::DeckReshuffled { size: 23 })));
        assert_eq!(state.hand(Side::Home).len(), before + 1);
        assert_eq!(state.deck.len(), 22);
    }

    #[test]
    fn opening_turn_expires_agility_and_flags_empty_hand() {
        let mut state = GameState::sample();
        let coord = Coord::new(Side::Home, 3, 0);
        state
            .board
            .get_mut(coord)
            .expect("red should exist")
            .agility_turns = 1;
        state.hand_mut(Side::Home).clear();

        state.open_turn(Side::Home);

        assert_eq!(state.board.get(coord).map(|c| c.agility_turns), Some(0));
        assert_eq!(state.phase, GamePhase::Resolving);
        assert!(state.chain.is_in_flight());
    }

    #[test]
    fn integrity_rejects_duplicate_team() {
        let mut state = GameState::sample();
        state.board.set(
            Coord::new(Side::Home, 4, 0),
            Some(Character::new(Team::Green, 5)),
        );
        state.board.take(Coord::new(Side::Home, 3, 0));
        assert_eq!(
            state.integrity_check(),
            Err(IntegrityError::DuplicateTeam { side: Side::Home })
        );
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let state = GameState::sample();
        let json = serde_json::to_string(&state).expect("serialize state");
        let restored: GameState = serde_json::from_str(&json).expect("restore state");
        assert_eq!(restored, state);
    }

    #[test]
    fn solo_mode_assigns_ai_to_away() {
        let state = GameState::sample();
        assert_eq!(state.controller(Side::Home), Controller::Local);
        assert_eq!(state.controller(Side::Away), Controller::Ai);
        let online = GameState::for_mode(GameMode::Online { local: Side::Away }, default_deck(), 1);
        assert_eq!(online.controller(Side::Home), Controller::Remote);
        assert_eq!(online.hand(Side::Away).len(), 23);
    }

    #[test]
    fn closing_turn_drops_unused_attack_bonus() {
        let mut state = GameState::sample();
        let home = Coord::new(Side::Home, 3, 0);
        let away = Coord::new(Side::Away, 2, 0);
        for (coord, bonus) in [(home, 3), (away, 2)] {
            if let Some(character) = state.board.get_mut(coord) {
                character.temp_attack_bonus = bonus;
            }
        }

        assert_eq!(state.close_turn(), GameEvent::TurnEnded { side: Side::Home });
        assert_eq!(state.board.get(home).map(|c| c.temp_attack_bonus), Some(0));
        assert_eq!(state.board.get(away).map(|c| c.temp_attack_bonus), Some(2));
        assert_eq!(state.turns_taken(Side::Home), 1);
    }
}
