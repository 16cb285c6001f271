use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::game::{
    Board, Card, CardKind, CardRole, Character, Coord, GameEvent, GameState, RuleEngine, RuleError,
    RuleResolution, Side,
};

const LONE_FRONT_BONUS: f64 = 1000.0;
const LOW_DEFENSE_BONUS: f64 = 500.0;
const FRONT_ROW_BONUS: f64 = 100.0;
const COUNTER_URGENCY_BONUS: f64 = 400.0;
const LOW_DEFENSE_THRESHOLD: i32 = 3;

const LEAD_TARGET_BONUS: f64 = 1000.0;
const CLEAN_PUSH_BONUS: f64 = 500.0;
const KNOCKOUT_BONUS: f64 = 200.0;
const NOMINAL_DAMAGE: i32 = 1;

/// AI 选出的一步行动。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum AiMove {
    Play {
        actor: Coord,
        card_index: usize,
        #[serde(default)]
        targets: Vec<Coord>,
    },
    /// 没有可评分的走法时弃掉第一张手牌并结束回合。
    Discard { card_index: usize },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiStrategy {
    Heuristic,
    Random,
}

impl FromStr for AiStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heuristic" | "greedy" | "default" => Ok(AiStrategy::Heuristic),
            "random" => Ok(AiStrategy::Random),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    Normal,
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "normal" | "medium" | "hard" => Ok(AiDifficulty::Normal),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub strategy: AiStrategy,
    /// 是否在决策里附带一次完整结算的预演结果。
    pub preview: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        match difficulty {
            AiDifficulty::Easy => Self {
                strategy: AiStrategy::Random,
                preview: false,
                seed: None,
            },
            AiDifficulty::Normal => Self {
                strategy: AiStrategy::Heuristic,
                preview: true,
                seed: None,
            },
        }
    }

    pub fn with_strategy(mut self, strategy: AiStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn seeded(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::Normal)
    }
}

/// 一个打过分的候选走法。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub actor: Coord,
    pub card_index: usize,
    pub targets: Vec<Coord>,
    pub score: f64,
}

impl Candidate {
    fn into_move(self) -> AiMove {
        AiMove::Play {
            actor: self.actor,
            card_index: self.card_index,
            targets: self.targets,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<AiMove>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<f64>,
    pub candidates: usize,
    pub strategy: AiStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<RuleResolution>,
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn decide_action(&mut self, state: &GameState, side: Side) -> AiDecision {
        let strategy = self.config.strategy;
        if state.is_finished() || state.active_side != side || state.chain.is_in_flight() {
            return AiDecision {
                action: None,
                evaluation: None,
                candidates: 0,
                strategy,
                resolution: None,
            };
        }

        let candidates = enumerate_candidates(state, side);
        let count = candidates.len();
        let chosen = match strategy {
            AiStrategy::Heuristic => best_candidate(candidates),
            AiStrategy::Random => candidates.choose(&mut self.rng).cloned(),
        };

        let (action, evaluation) = match chosen {
            Some(candidate) => {
                let score = candidate.score;
                (candidate.into_move(), Some(score))
            }
            None => (AiMove::Discard { card_index: 0 }, None),
        };

        crate::console_log!(
            "[zones] ai {:?} picked {:?} from {} candidates",
            side,
            action,
            count
        );
        let resolution = if self.config.preview {
            simulate_resolution(state, side, &action).ok()
        } else {
            None
        };

        AiDecision {
            action: Some(action),
            evaluation,
            candidates: count,
            strategy,
            resolution,
        }
    }
}

/// 通过规则引擎的选择命令执行一步 AI 行动，和玩家输入走同一条路径。
pub fn apply_move(
    engine: &mut RuleEngine,
    state: &mut GameState,
    side: Side,
    action: &AiMove,
) -> Result<Vec<GameEvent>, RuleError> {
    match action {
        AiMove::Play {
            actor,
            card_index,
            targets,
        } => {
            let mut events = engine.select_character(state, side, *actor)?;
            events.extend(engine.select_card(state, side, *card_index)?);
            for target in targets {
                events.extend(engine.select_target(state, side, *target)?);
            }
            Ok(events)
        }
        AiMove::Discard { card_index } => engine.discard(state, side, *card_index),
    }
}

fn simulate_resolution(
    state: &GameState,
    side: Side,
    action: &AiMove,
) -> Result<RuleResolution, RuleError> {
    let mut next_state = state.clone();
    let mut engine = RuleEngine::new();
    let mut events = apply_move(&mut engine, &mut next_state, side, action)?;
    // 对方回合开头的提示留给对方确认。
    while next_state.active_side == side && next_state.chain.awaiting().is_some() {
        events.extend(engine.acknowledge(&mut next_state)?);
    }
    Ok(RuleResolution::new(next_state, events))
}

/// 严格大于才替换，同分时保留先枚举到的走法。
fn best_candidate(candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(current) if candidate.score <= current.score => Some(current),
        _ => Some(candidate),
    })
}

/// 枚举 `side` 当前所有可评分走法：角色按区域、通道顺序，再按手牌顺序。
pub fn enumerate_candidates(state: &GameState, side: Side) -> Vec<Candidate> {
    let board = &state.board;
    let enemy = side.opponent();
    let targetable = board.targetable(enemy);
    let lead_zone = Board::forward_of(enemy, targetable.iter().map(|(coord, _)| coord.zone));
    let taunter = targetable
        .iter()
        .find(|(_, character)| character.is_taunting())
        .copied();
    let single_targets: Vec<(Coord, Character)> = match taunter {
        Some(found) => vec![found],
        None => targetable.clone(),
    };

    let front = board.most_forward_zone(side);
    let front_count = front.map_or(0, |zone| board.zone_count(side, zone));

    let mut candidates = Vec::new();
    for (actor, character) in board.occupants(side) {
        let in_front = Some(actor.zone) == front;
        let alone_in_front = in_front && front_count == 1;

        for (card_index, card) in state.hand(side).iter().enumerate() {
            if let Some(score) = defense_score(card, &character, in_front, alone_in_front) {
                candidates.push(Candidate {
                    actor,
                    card_index,
                    targets: Vec::new(),
                    score,
                });
            }

            if card.role() == CardRole::SingleTarget {
                for (coord, target) in &single_targets {
                    candidates.push(Candidate {
                        actor,
                        card_index,
                        targets: vec![*coord],
                        score: strike_score(card, *coord, target, lead_zone),
                    });
                }
            }

            if card.role() == CardRole::MultiTarget {
                let arity = usize::from(card.profile().target_count);
                let size = arity.min(targetable.len());
                for combo in combinations(&targetable, size) {
                    let Some(ordered) = taunt_first(combo, taunter.map(|(coord, _)| coord)) else {
                        continue;
                    };
                    let score: f64 = ordered
                        .iter()
                        .map(|(coord, target)| blast_score(card, *coord, target, lead_zone))
                        .sum();
                    candidates.push(Candidate {
                        actor,
                        card_index,
                        targets: ordered.iter().map(|(coord, _)| *coord).collect(),
                        score,
                    });
                }
            }
        }
    }
    candidates
}

/// 防御类卡牌：优先保护独自在最前线或防御偏低的角色。
fn defense_score(card: &Card, actor: &Character, in_front: bool, alone_in_front: bool) -> Option<f64> {
    let kind = card.kind();
    let boost = match kind {
        CardKind::Defense | CardKind::Taunt | CardKind::Fortify => card.profile().defense_boost?,
        CardKind::Counter | CardKind::CounterAssault => 0,
        _ => return None,
    };

    let low = actor.defense <= LOW_DEFENSE_THRESHOLD;
    let mut score = f64::from(boost);
    if alone_in_front {
        score += LONE_FRONT_BONUS;
    }
    if low {
        score += LOW_DEFENSE_BONUS;
    }
    if in_front {
        score += FRONT_ROW_BONUS;
    }
    if matches!(kind, CardKind::Counter | CardKind::CounterAssault) && (low || alone_in_front) {
        score += COUNTER_URGENCY_BONUS;
    }
    Some(score)
}

/// 单体攻击：伤害越接近目标防御越好，外加领先位置、恰好击退与击出场外的奖励。
fn strike_score(card: &Card, coord: Coord, target: &Character, lead_zone: Option<u8>) -> f64 {
    let (overkill, clean_push, knockout) = if card.kind() == CardKind::Endeavor {
        (
            target.defense - 1,
            target.defense > 1,
            target.defense == 1,
        )
    } else {
        let damage = card.profile().base_damage.unwrap_or(NOMINAL_DAMAGE);
        (
            damage - target.defense,
            damage == target.defense,
            Board::is_back_edge(coord) && damage >= target.defense,
        )
    };
    bonus_score(overkill, clean_push, knockout, Some(coord.zone) == lead_zone)
}

fn blast_score(card: &Card, coord: Coord, target: &Character, lead_zone: Option<u8>) -> f64 {
    let damage = card.profile().base_damage.unwrap_or(NOMINAL_DAMAGE);
    bonus_score(
        damage - target.defense,
        damage == target.defense,
        Board::is_back_edge(coord) && damage >= target.defense,
        Some(coord.zone) == lead_zone,
    )
}

fn bonus_score(overkill: i32, clean_push: bool, knockout: bool, leading: bool) -> f64 {
    let mut score = -f64::from(overkill.abs());
    if leading {
        score += LEAD_TARGET_BONUS;
    }
    if clean_push {
        score += CLEAN_PUSH_BONUS;
    }
    if knockout {
        score += KNOCKOUT_BONUS;
    }
    score
}

/// 有嘲讽者时组合必须包含它，并把它排到第一个。
fn taunt_first<T: Copy>(combo: Vec<(Coord, T)>, taunter: Option<Coord>) -> Option<Vec<(Coord, T)>> {
    let Some(taunter) = taunter else {
        return Some(combo);
    };
    let position = combo.iter().position(|(coord, _)| *coord == taunter)?;
    let mut ordered = combo;
    let pinned = ordered.remove(position);
    ordered.insert(0, pinned);
    Some(ordered)
}

/// 按字典序列出 `items` 的所有 `k` 元组合。
fn combinations<T: Clone>(items: &[T], k: usize) -> Vec<Vec<T>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    let Some((first, rest)) = items.split_first() else {
        return Vec::new();
    };
    let mut with_first: Vec<Vec<T>> = combinations(rest, k - 1)
        .into_iter()
        .map(|mut combo| {
            combo.insert(0, first.clone());
            combo
        })
        .collect();
    with_first.extend(combinations(rest, k));
    with_first
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{default_deck, GameMode, Team, VisibleEffect};

    fn ai_turn(hand: Vec<Card>) -> GameState {
        let mut state = GameState::new(GameMode::Solo, default_deck(), hand);
        let mut engine = RuleEngine::new();
        engine.start_game(&mut state).expect("game starts");
        engine
            .discard(&mut state, Side::Home, 0)
            .expect("home passes");
        engine.settle(&mut state);
        state
    }

    fn heuristic() -> AiAgent {
        AiAgent::with_seed(AiConfig::default().with_preview(false), 7)
    }

    #[test]
    fn combinations_are_lexicographic() {
        let combos = combinations(&[1, 2, 3], 2);
        assert_eq!(combos, vec![vec![1, 2], vec![1, 3], vec![2, 3]]);
        assert_eq!(combinations(&[1, 2], 3), Vec::<Vec<i32>>::new());
        assert_eq!(combinations::<i32>(&[], 0), vec![Vec::<i32>::new()]);
    }

    #[test]
    fn prefers_exact_push_back() {
        let mut state = ai_turn(vec![Card::Attack { value: 5 }]);
        if let Some(character) = state.board.get_mut(Coord::new(Side::Home, 3, 1)) {
            character.defense = 9;
        }
        let decision = heuristic().decide_action(&state, Side::Away);
        assert_eq!(
            decision.action,
            Some(AiMove::Play {
                actor: Coord::new(Side::Away, 2, 0),
                card_index: 0,
                targets: vec![Coord::new(Side::Home, 3, 0)],
            })
        );
        assert_eq!(decision.evaluation, Some(1500.0));
    }

    #[test]
    fn protects_lone_front_character() {
        let mut state = ai_turn(vec![Card::Counter, Card::Attack { value: 1 }]);
        let front = Coord::new(Side::Away, 2, 1);
        let moved = state.board.take(front).expect("green present");
        state.board.set(Coord::new(Side::Away, 3, 1), Some(moved));
        state.board.take(Coord::new(Side::Home, 3, 1));
        state
            .board
            .set(Coord::new(Side::Home, 4, 1), Some(Character::new(Team::Green, 5)));

        let decision = heuristic().decide_action(&state, Side::Away);
        assert_eq!(
            decision.action,
            Some(AiMove::Play {
                actor: Coord::new(Side::Away, 3, 1),
                card_index: 0,
                targets: Vec::new(),
            })
        );
        assert_eq!(decision.evaluation, Some(1000.0 + 100.0 + 400.0));
    }

    #[test]
    fn multi_target_combo_pins_taunter() {
        let mut state = ai_turn(vec![Card::DoubleBlast { value: 5 }]);
        if let Some(character) = state.board.get_mut(Coord::new(Side::Home, 3, 2)) {
            character.taunt_stacks = 1;
        }
        let candidates = enumerate_candidates(&state, Side::Away);
        assert!(!candidates.is_empty());
        assert!(candidates
            .iter()
            .all(|candidate| candidate.targets.first() == Some(&Coord::new(Side::Home, 3, 2))));
        assert!(candidates.iter().all(|candidate| candidate.targets.len() == 2));
    }

    #[test]
    fn falls_back_to_discard_without_candidates() {
        let state = ai_turn(vec![Card::Sacrifice]);
        let decision = heuristic().decide_action(&state, Side::Away);
        assert_eq!(decision.action, Some(AiMove::Discard { card_index: 0 }));
        assert_eq!(decision.candidates, 0);
    }

    #[test]
    fn chosen_move_applies_through_rule_engine() {
        let mut state = ai_turn(vec![Card::Attack { value: 5 }, Card::Defense { value: 2 }]);
        let decision = heuristic().decide_action(&state, Side::Away);
        let action = decision.action.expect("a move is chosen");

        let mut engine = RuleEngine::new();
        apply_move(&mut engine, &mut state, Side::Away, &action).expect("move is legal");
        engine.settle(&mut state);
        assert_eq!(state.active_side, Side::Home);
        assert_eq!(state.hand(Side::Away).len(), 1);
    }

    #[test]
    fn preview_reports_resolved_state() {
        let state = ai_turn(vec![Card::Attack { value: 5 }]);
        let mut agent = AiAgent::with_seed(AiConfig::default(), 1);
        let decision = agent.decide_action(&state, Side::Away);
        let preview = decision.resolution.expect("preview attached");
        assert_eq!(preview.state.active_side, Side::Home);
        assert!(preview.awaiting.is_none());
    }

    #[test]
    fn idle_when_not_its_turn() {
        let state = ai_turn(vec![Card::Attack { value: 5 }]);
        let decision = heuristic().decide_action(&state, Side::Home);
        assert!(decision.action.is_none());
    }

    #[test]
    fn random_strategy_picks_a_scored_candidate() {
        let state = ai_turn(vec![Card::Attack { value: 2 }]);
        let config = AiConfig::from_difficulty(AiDifficulty::Easy);
        let first = AiAgent::new(config.clone().seeded(11)).decide_action(&state, Side::Away);
        let decision = AiAgent::new(config.seeded(11)).decide_action(&state, Side::Away);
        assert_eq!(first.action, decision.action);
        assert_eq!(decision.strategy, AiStrategy::Random);
        assert!(matches!(decision.action, Some(AiMove::Play { .. })));
        assert_eq!(decision.candidates, 9);
    }

    #[test]
    fn heuristic_pick_is_stable_across_runs() {
        let state = ai_turn(vec![Card::Attack { value: 2 }, Card::DoubleBlast { value: 3 }]);
        let first = AiAgent::with_seed(AiConfig::default(), 3).decide_action(&state, Side::Away);
        let second = AiAgent::with_seed(AiConfig::default(), 99).decide_action(&state, Side::Away);
        assert!(first.action.is_some());
        assert_eq!(first.action, second.action);
        assert_eq!(first.evaluation, second.evaluation);
        assert_eq!(
            enumerate_candidates(&state, Side::Away),
            enumerate_candidates(&state, Side::Away)
        );
    }

    #[test]
    fn hard_parses_as_heuristic_search() {
        assert_eq!(AiDifficulty::from_str("Hard"), Ok(AiDifficulty::Normal));
        assert_eq!(
            AiConfig::from_difficulty(AiDifficulty::from_str("hard").expect("known level")).strategy,
            AiStrategy::Heuristic
        );
    }

    #[test]
    fn preview_stops_at_opponent_turn_banner() {
        let mut state = GameState::new(
            GameMode::Solo,
            vec![Card::Counter],
            vec![Card::Attack { value: 5 }],
        );
        let mut engine = RuleEngine::new();
        engine.start_game(&mut state).expect("game starts");
        engine
            .discard(&mut state, Side::Home, 0)
            .expect("home passes");
        engine.settle(&mut state);
        assert_eq!(state.active_side, Side::Away);

        let decision = AiAgent::with_seed(AiConfig::default(), 5).decide_action(&state, Side::Away);
        let preview = decision.resolution.expect("preview attached");
        assert_eq!(preview.state.active_side, Side::Home);
        assert_eq!(preview.state.turns_taken(Side::Home), 1);
        assert_eq!(
            preview.awaiting,
            Some(VisibleEffect::Banner {
                text: "No valid cards to play!".to_string()
            })
        );
        assert!(preview.victory.is_none());
    }
}
