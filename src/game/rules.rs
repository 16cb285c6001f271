use serde::{Deserialize, Serialize};

use super::{
    board::{Board, Coord, Side},
    cards::{Card, DeckError},
    effects::{Actor, EffectEngine, EffectResolution, Step, VisibleEffect},
    state::{GameEvent, GamePhase, GameState, IntegrityError, VictoryState},
};

/// 玩家输入。每条命令都带发出方，由规则引擎判断是否轮到它。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Command {
    StartGame,
    SelectCharacter { coord: Coord },
    SelectCard { index: usize },
    SelectTarget { coord: Coord },
    /// 前端完成当前展示后确认。
    Acknowledge,
    /// 丢弃一张手牌并结束回合。
    Discard { index: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    GameFinished,
    GameNotStarted,
    GameAlreadyStarted,
    NotPlayerTurn,
    EffectInFlight,
    NothingToAcknowledge,
    InvalidCoordinate { coord: Coord },
    EmptyCell { coord: Coord },
    NotOwnCharacter { coord: Coord },
    NoCharacterSelected,
    NoCardSelected,
    CardNotFound { index: usize },
    NoLegalTargets,
    TargetNotRequired,
    NotEnemyCharacter { coord: Coord },
    AgileTarget { coord: Coord },
    TauntRedirect { taunter: Coord },
    DuplicateTarget { coord: Coord },
    InvalidDeck { error: DeckError },
    IntegrityViolation { error: IntegrityError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<VisibleEffect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victory: Option<VictoryState>,
}

impl RuleResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        let victory = state.outcome.clone();
        let awaiting = state.chain.awaiting().cloned();
        Self {
            state,
            events,
            awaiting,
            victory,
        }
    }
}

#[derive(Default)]
pub struct RuleEngine {
    effect_engine: EffectEngine,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            effect_engine: EffectEngine::new(),
        }
    }

    fn ensure_running(state: &GameState) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        if state.phase == GamePhase::Setup {
            return Err(RuleError::GameNotStarted);
        }
        Ok(())
    }

    fn ensure_turn_owner(state: &GameState, issuer: Side) -> Result<(), RuleError> {
        if state.active_side != issuer {
            return Err(RuleError::NotPlayerTurn);
        }
        Ok(())
    }

    fn ensure_idle(state: &GameState) -> Result<(), RuleError> {
        if state.chain.is_in_flight() {
            return Err(RuleError::EffectInFlight);
        }
        Ok(())
    }

    fn ensure_input(state: &GameState, issuer: Side) -> Result<(), RuleError> {
        Self::ensure_running(state)?;
        Self::ensure_turn_owner(state, issuer)?;
        Self::ensure_idle(state)
    }

    pub fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn absorb(state: &mut GameState, resolution: EffectResolution, events: &mut Vec<GameEvent>) {
        events.extend(resolution.events);
        if let Some(VisibleEffect::Banner { text }) = &resolution.awaiting {
            crate::console_log!("[zones] {text}");
        }
        if state.is_finished() {
            state.selection.clear();
        }
    }

    pub fn handle(
        &mut self,
        state: &mut GameState,
        issuer: Side,
        command: Command,
    ) -> Result<Vec<GameEvent>, RuleError> {
        match command {
            Command::StartGame => self.start_game(state),
            Command::SelectCharacter { coord } => self.select_character(state, issuer, coord),
            Command::SelectCard { index } => self.select_card(state, issuer, index),
            Command::SelectTarget { coord } => self.select_target(state, issuer, coord),
            Command::Acknowledge => self.acknowledge(state),
            Command::Discard { index } => self.discard(state, issuer, index),
        }
    }

    /// 离开准备阶段，开始 Home 方的第一个回合。
    pub fn start_game(&mut self, state: &mut GameState) -> Result<Vec<GameEvent>, RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        if state.phase != GamePhase::Setup {
            return Err(RuleError::GameAlreadyStarted);
        }
        Self::ensure_integrity(state)?;

        let mut events = state.open_turn(Side::Home);
        let resolution = self.effect_engine.run(state);
        Self::absorb(state, resolution, &mut events);
        Ok(events)
    }

    /// 选择己方角色；重新选择会清空已选卡牌与目标。
    pub fn select_character(
        &mut self,
        state: &mut GameState,
        issuer: Side,
        coord: Coord,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_input(state, issuer)?;
        if !coord.is_valid() {
            return Err(RuleError::InvalidCoordinate { coord });
        }
        if coord.side != issuer {
            return Err(RuleError::NotOwnCharacter { coord });
        }
        if state.board.get(coord).is_none() {
            return Err(RuleError::EmptyCell { coord });
        }

        state.selection.clear();
        state.selection.character = Some(coord);
        let event = GameEvent::CharacterSelected { coord };
        state.record_event(event.clone());
        Ok(vec![event])
    }

    /// 选择手牌；无需目标的卡立即结算，否则等待选目标。
    pub fn select_card(
        &mut self,
        state: &mut GameState,
        issuer: Side,
        index: usize,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_input(state, issuer)?;
        if state.selection.character.is_none() {
            return Err(RuleError::NoCharacterSelected);
        }
        let card = *state
            .hand(issuer)
            .get(index)
            .ok_or(RuleError::CardNotFound { index })?;
        if card.requires_target() && Self::required_targets(&state.board, issuer, &card) == 0 {
            return Err(RuleError::NoLegalTargets);
        }

        state.selection.card = Some(index);
        state.selection.targets.clear();
        let event = GameEvent::CardSelected {
            side: issuer,
            index,
            card,
        };
        state.record_event(event.clone());
        let mut events = vec![event];

        if !card.requires_target() {
            events.extend(self.commit(state, issuer)?);
        }
        Ok(events)
    }

    /// 选择一个敌方目标；凑够所需数量后自动结算。
    pub fn select_target(
        &mut self,
        state: &mut GameState,
        issuer: Side,
        coord: Coord,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_input(state, issuer)?;
        if state.selection.character.is_none() {
            return Err(RuleError::NoCharacterSelected);
        }
        let index = state.selection.card.ok_or(RuleError::NoCardSelected)?;
        let card = *state
            .hand(issuer)
            .get(index)
            .ok_or(RuleError::CardNotFound { index })?;
        if !card.requires_target() {
            return Err(RuleError::TargetNotRequired);
        }
        Self::check_target(&state.board, issuer, &state.selection.targets, coord)?;

        state.selection.targets.push(coord);
        let event = GameEvent::TargetSelected { coord };
        state.record_event(event.clone());
        let mut events = vec![event];

        if state.selection.targets.len() >= Self::required_targets(&state.board, issuer, &card) {
            events.extend(self.commit(state, issuer)?);
        }
        Ok(events)
    }

    /// 确认当前展示已结束，推进效果链。
    pub fn acknowledge(&mut self, state: &mut GameState) -> Result<Vec<GameEvent>, RuleError> {
        let resolution = self
            .effect_engine
            .acknowledge(state)
            .ok_or(RuleError::NothingToAcknowledge)?;
        let mut events = Vec::new();
        Self::absorb(state, resolution, &mut events);
        Ok(events)
    }

    /// 丢弃一张手牌（手牌为空时直接跳过）并结束回合。
    pub fn discard(
        &mut self,
        state: &mut GameState,
        issuer: Side,
        index: usize,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_input(state, issuer)?;
        let mut events = Vec::new();
        if !state.hand(issuer).is_empty() {
            if index >= state.hand(issuer).len() {
                return Err(RuleError::CardNotFound { index });
            }
            let card = state.hand_mut(issuer).remove(index);
            let event = GameEvent::CardDiscarded { side: issuer, card };
            state.record_event(event.clone());
            events.push(event);
        }
        state.selection.clear();

        let resolution = self.effect_engine.begin(state, vec![Step::EndTurn]);
        Self::absorb(state, resolution, &mut events);
        Ok(events)
    }

    /// 自动确认所有展示，直到效果链清空。
    pub fn settle(&mut self, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while state.chain.awaiting().is_some() {
            match self.acknowledge(state) {
                Ok(more) => events.extend(more),
                Err(_) => break,
            }
        }
        events
    }

    /// 当前选择下可以点选的敌方角色，用于前端高亮。
    pub fn legal_targets(state: &GameState, issuer: Side) -> Vec<Coord> {
        let Some(card) = state
            .selection
            .card
            .and_then(|index| state.hand(issuer).get(index))
        else {
            return Vec::new();
        };
        if !card.requires_target() {
            return Vec::new();
        }
        state
            .board
            .occupants(issuer.opponent())
            .into_iter()
            .map(|(coord, _)| coord)
            .filter(|coord| {
                Self::check_target(&state.board, issuer, &state.selection.targets, *coord).is_ok()
            })
            .collect()
    }

    /// 需要的目标数：卡牌目标数与可选敌人数取小。
    pub fn required_targets(board: &Board, issuer: Side, card: &Card) -> usize {
        let arity = usize::from(card.profile().target_count);
        arity.min(board.targetable(issuer.opponent()).len())
    }

    /// 目标合法性：敌方、有人、非敏捷、不重复，且有可选嘲讽者时必须先选它。
    pub fn check_target(
        board: &Board,
        issuer: Side,
        chosen: &[Coord],
        coord: Coord,
    ) -> Result<(), RuleError> {
        if !coord.is_valid() {
            return Err(RuleError::InvalidCoordinate { coord });
        }
        if coord.side != issuer.opponent() {
            return Err(RuleError::NotEnemyCharacter { coord });
        }
        let character = board.get(coord).ok_or(RuleError::EmptyCell { coord })?;
        if character.is_agile() {
            return Err(RuleError::AgileTarget { coord });
        }
        if chosen.contains(&coord) {
            return Err(RuleError::DuplicateTarget { coord });
        }
        if let Some(taunter) = board.taunting(coord.side) {
            let taunter_targetable = board.get(taunter).map_or(false, |c| !c.is_agile());
            if taunter_targetable && taunter != coord && !chosen.contains(&taunter) {
                return Err(RuleError::TauntRedirect { taunter });
            }
        }
        Ok(())
    }

    fn commit(&mut self, state: &mut GameState, issuer: Side) -> Result<Vec<GameEvent>, RuleError> {
        let origin = state
            .selection
            .character
            .ok_or(RuleError::NoCharacterSelected)?;
        let index = state.selection.card.ok_or(RuleError::NoCardSelected)?;
        let character = *state
            .board
            .get(origin)
            .ok_or(RuleError::EmptyCell { coord: origin })?;
        if index >= state.hand(issuer).len() {
            return Err(RuleError::CardNotFound { index });
        }

        let card = state.hand_mut(issuer).remove(index);
        let targets = std::mem::take(&mut state.selection.targets);
        state.selection.clear();

        let event = GameEvent::CardPlayed {
            side: issuer,
            actor: origin,
            card,
            targets: targets.clone(),
        };
        state.record_event(event.clone());
        crate::console_log!("[zones] {:?} plays {}", issuer, card.name());
        let mut events = vec![event];

        let actor = Actor {
            side: issuer,
            team: character.team,
        };
        let steps = self.effect_engine.plan(&card, actor, origin, &targets);
        state.phase = GamePhase::Resolving;
        let resolution = self.effect_engine.begin(state, steps);
        Self::absorb(state, resolution, &mut events);
        Ok(events)
    }

    pub fn check_victory(state: &mut GameState) -> Option<VictoryState> {
        state.evaluate_victory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{Character, Team};
    use crate::game::cards::default_deck;
    use crate::game::state::GameMode;

    fn started(hand: Vec<Card>) -> (RuleEngine, GameState) {
        let mut engine = RuleEngine::new();
        let mut state = GameState::new(GameMode::Hotseat, hand, default_deck());
        engine.start_game(&mut state).expect("game starts");
        (engine, state)
    }

    fn home(zone: u8, lane: u8) -> Coord {
        Coord::new(Side::Home, zone, lane)
    }

    fn away(zone: u8, lane: u8) -> Coord {
        Coord::new(Side::Away, zone, lane)
    }

    #[test]
    fn input_rejected_before_start() {
        let mut engine = RuleEngine::new();
        let mut state = GameState::sample();
        let result = engine.select_character(&mut state, Side::Home, home(3, 0));
        assert_eq!(result, Err(RuleError::GameNotStarted));
    }

    #[test]
    fn attack_card_walks_through_chain_and_passes_turn() {
        let (mut engine, mut state) = started(vec![Card::Attack { value: 3 }]);

        engine
            .select_character(&mut state, Side::Home, home(3, 0))
            .expect("select red");
        engine
            .select_card(&mut state, Side::Home, 0)
            .expect("select attack");
        engine
            .select_target(&mut state, Side::Home, away(2, 1))
            .expect("target green");

        assert!(matches!(
            state.chain.awaiting(),
            Some(VisibleEffect::AttackTravel { .. })
        ));
        assert_eq!(
            engine.select_character(&mut state, Side::Home, home(3, 0)),
            Err(RuleError::EffectInFlight)
        );

        engine.settle(&mut state);
        assert_eq!(state.board.get(away(2, 1)).map(|c| c.defense), Some(2));
        assert!(state.hand(Side::Home).is_empty());
        assert_eq!(state.active_side, Side::Away);
        assert_eq!(state.turns_taken(Side::Home), 1);
        assert_eq!(state.phase, GamePhase::Main);
    }

    #[test]
    fn taunt_forces_target_choice() {
        let (mut engine, mut state) = started(vec![Card::Attack { value: 3 }]);
        if let Some(character) = state.board.get_mut(away(2, 2)) {
            character.taunt_stacks = 1;
        }

        engine
            .select_character(&mut state, Side::Home, home(3, 0))
            .expect("select red");
        engine
            .select_card(&mut state, Side::Home, 0)
            .expect("select attack");
        assert_eq!(
            engine.select_target(&mut state, Side::Home, away(2, 0)),
            Err(RuleError::TauntRedirect {
                taunter: away(2, 2)
            })
        );
        assert_eq!(
            RuleEngine::legal_targets(&state, Side::Home),
            vec![away(2, 2)]
        );
    }

    #[test]
    fn agile_characters_cannot_be_targeted() {
        let (mut engine, mut state) = started(vec![Card::Attack { value: 3 }]);
        if let Some(character) = state.board.get_mut(away(2, 0)) {
            character.agility_turns = 1;
        }
        engine
            .select_character(&mut state, Side::Home, home(3, 1))
            .expect("select green");
        engine
            .select_card(&mut state, Side::Home, 0)
            .expect("select attack");
        assert_eq!(
            engine.select_target(&mut state, Side::Home, away(2, 0)),
            Err(RuleError::AgileTarget { coord: away(2, 0) })
        );
    }

    #[test]
    fn triple_blast_commits_early_when_fewer_enemies() {
        let (mut engine, mut state) = started(vec![Card::TripleBlast { value: 1 }]);
        state.board.take(away(2, 2));

        engine
            .select_character(&mut state, Side::Home, home(3, 0))
            .expect("select red");
        engine
            .select_card(&mut state, Side::Home, 0)
            .expect("select blast");
        engine
            .select_target(&mut state, Side::Home, away(2, 0))
            .expect("first target");
        assert!(state.chain.is_idle());
        assert_eq!(
            engine.select_target(&mut state, Side::Home, away(2, 0)),
            Err(RuleError::DuplicateTarget { coord: away(2, 0) })
        );
        engine
            .select_target(&mut state, Side::Home, away(2, 1))
            .expect("second target commits");
        assert!(state.chain.is_in_flight());

        engine.settle(&mut state);
        assert_eq!(state.board.get(away(2, 0)).map(|c| c.defense), Some(4));
        assert_eq!(state.board.get(away(2, 1)).map(|c| c.defense), Some(4));
    }

    #[test]
    fn self_buff_resolves_without_targets() {
        let (mut engine, mut state) = started(vec![Card::Defense { value: 3 }]);
        engine
            .select_character(&mut state, Side::Home, home(3, 2))
            .expect("select blue");
        engine
            .select_card(&mut state, Side::Home, 0)
            .expect("defense resolves");
        engine.settle(&mut state);
        assert_eq!(state.board.get(home(3, 2)).map(|c| c.defense), Some(8));
        assert_eq!(state.active_side, Side::Away);
    }

    #[test]
    fn reselecting_a_character_clears_the_card() {
        let (mut engine, mut state) = started(vec![Card::Attack { value: 2 }]);
        engine
            .select_character(&mut state, Side::Home, home(3, 0))
            .expect("select red");
        engine
            .select_card(&mut state, Side::Home, 0)
            .expect("select attack");
        engine
            .select_character(&mut state, Side::Home, home(3, 1))
            .expect("switch to green");
        assert_eq!(state.selection.card, None);
        assert_eq!(
            engine.select_target(&mut state, Side::Home, away(2, 0)),
            Err(RuleError::NoCardSelected)
        );
    }

    #[test]
    fn wrong_side_and_off_turn_input_is_ignored() {
        let (mut engine, mut state) = started(vec![Card::Attack { value: 2 }]);
        assert_eq!(
            engine.select_character(&mut state, Side::Home, away(2, 0)),
            Err(RuleError::NotOwnCharacter { coord: away(2, 0) })
        );
        assert_eq!(
            engine.select_character(&mut state, Side::Away, away(2, 0)),
            Err(RuleError::NotPlayerTurn)
        );
        assert_eq!(
            engine.select_character(&mut state, Side::Home, home(4, 0)),
            Err(RuleError::EmptyCell { coord: home(4, 0) })
        );
    }

    #[test]
    fn empty_hand_auto_ends_turn() {
        let (mut engine, mut state) = started(Vec::new());
        assert_eq!(
            state.chain.awaiting(),
            Some(&VisibleEffect::Banner {
                text: "No valid cards to play!".to_string()
            })
        );
        engine.acknowledge(&mut state).expect("banner acknowledged");
        assert_eq!(state.active_side, Side::Away);
        assert_eq!(state.turns_taken(Side::Home), 1);
    }

    #[test]
    fn knockout_of_last_character_ends_the_game() {
        let (mut engine, mut state) = started(vec![Card::Overblast]);
        state.board.take(away(2, 0));
        state.board.take(away(2, 1));
        state.board.take(away(2, 2));
        state
            .board
            .set(away(0, 1), Some(Character::new(Team::Green, 5)));

        engine
            .select_character(&mut state, Side::Home, home(3, 0))
            .expect("select red");
        engine
            .select_card(&mut state, Side::Home, 0)
            .expect("select overblast");
        engine
            .select_target(&mut state, Side::Home, away(0, 1))
            .expect("target last enemy");
        engine.settle(&mut state);

        let outcome = state.outcome.clone().expect("game over");
        assert_eq!(outcome.winner, Some(Side::Home));
        assert_eq!(state.phase, GamePhase::Finished);
        assert_eq!(
            engine.select_character(&mut state, Side::Home, home(3, 1)),
            Err(RuleError::GameFinished)
        );
    }

    #[test]
    fn clean_hit_pushes_back_and_line_advances() {
        let (mut engine, mut state) = started(vec![Card::Attack { value: 5 }]);
        state.board.take(away(2, 1));
        state.board.take(away(2, 2));
        state
            .board
            .set(away(1, 1), Some(Character::new(Team::Green, 5)));

        engine
            .select_character(&mut state, Side::Home, home(3, 0))
            .expect("select red");
        engine
            .select_card(&mut state, Side::Home, 0)
            .expect("select attack");
        engine
            .select_target(&mut state, Side::Home, away(2, 0))
            .expect("target red");
        engine.settle(&mut state);

        let pushed = state.board.get(away(1, 0)).expect("red rebounded");
        assert_eq!(pushed.defense, 5);
        assert_eq!(pushed.temp_attack_bonus, 2);
        for lane in 0..3 {
            assert!(state.board.get(home(2, lane)).is_some());
            assert!(state.board.get(home(3, lane)).is_none());
        }
        assert!(state.event_log.iter().any(|event| matches!(
            event,
            GameEvent::ZoneAdvanced {
                side: Side::Home,
                ..
            }
        )));
    }

    #[test]
    fn discard_ends_turn() {
        let (mut engine, mut state) = started(vec![Card::Attack { value: 2 }, Card::Counter]);
        let events = engine
            .discard(&mut state, Side::Home, 0)
            .expect("discard allowed");
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::CardDiscarded { .. })));
        assert_eq!(state.hand(Side::Home), &[Card::Counter]);
        assert_eq!(state.active_side, Side::Away);
    }
}
