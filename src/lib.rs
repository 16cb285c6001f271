pub mod ai;
pub mod game;
pub mod utils;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{apply_move, AiAgent, AiConfig, AiDecision, AiDifficulty, AiMove, AiStrategy};
pub use game::{
    default_deck, generate_opponent_deck, validate_deck, Board, Card, Command, Controller, Coord,
    DeckError, EffectEngine, GameEvent, GameMode, GamePhase, GameState, IntegrityError,
    RuleEngine, RuleError, RuleResolution, RulesConfig, Side, VictoryReason, VictoryState,
    VisibleEffect,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn make_resolution_json(resolution: RuleResolution) -> Result<String, JsValue> {
    serde_json::to_string(&resolution).map_err(serde_to_js_error)
}

fn resolution_from_events(state: &GameState, events: Vec<GameEvent>) -> RuleResolution {
    RuleResolution::new(state.clone(), events)
}

fn execute_with_engine<F>(state: &mut GameState, action: F) -> Result<Vec<GameEvent>, JsValue>
where
    F: FnOnce(&mut RuleEngine, &mut GameState) -> Result<Vec<GameEvent>, RuleError>,
{
    let mut engine = RuleEngine::new();
    action(&mut engine, state).map_err(|error| {
        crate::console_warn!("[zones] input rejected: {error:?}");
        to_js_error(error)
    })
}

fn side_from_index(index: u8) -> Result<Side, JsValue> {
    match index {
        0 => Ok(Side::Home),
        1 => Ok(Side::Away),
        _ => Err(JsValue::from_str(&format!("unknown side {index}"))),
    }
}

fn parse_mode(mode: Option<&str>) -> Result<GameMode, JsValue> {
    match mode.map(str::to_ascii_lowercase).as_deref() {
        None | Some("solo") | Some("ai") => Ok(GameMode::Solo),
        Some("hotseat") | Some("pvp") => Ok(GameMode::Hotseat),
        Some("online-home") | Some("host") => Ok(GameMode::Online { local: Side::Home }),
        Some("online-away") | Some("guest") => Ok(GameMode::Online { local: Side::Away }),
        Some(other) => Err(JsValue::from_str(&format!("unknown mode {other}"))),
    }
}

fn parse_deck(deck_json: Option<&str>) -> Result<Vec<Card>, JsValue> {
    let Some(json) = deck_json else {
        return Ok(default_deck());
    };
    let deck: Vec<Card> = serde_json::from_str(json).map_err(serde_to_js_error)?;
    validate_deck(&deck).map_err(|error| to_js_error(RuleError::InvalidDeck { error }))?;
    Ok(deck)
}

fn ai_config(difficulty: Option<&str>, strategy: Option<&str>) -> AiConfig {
    let difficulty = difficulty
        .and_then(|value| AiDifficulty::from_str(value).ok())
        .unwrap_or(AiDifficulty::Normal);
    let mut config = AiConfig::from_difficulty(difficulty);
    if let Some(strategy) = strategy.and_then(|value| AiStrategy::from_str(value).ok()) {
        config = config.with_strategy(strategy);
    }
    config
}

#[derive(Serialize)]
struct AiMoveResponse {
    decision: AiDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<RuleResolution>,
}

/// 前端持有的对局句柄。
#[wasm_bindgen]
pub struct ZonesEngine {
    state: GameState,
}

#[wasm_bindgen]
impl ZonesEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(
        mode: Option<String>,
        deck_json: Option<String>,
        seed: Option<u32>,
    ) -> Result<ZonesEngine, JsValue> {
        let mode = parse_mode(mode.as_deref())?;
        let deck = parse_deck(deck_json.as_deref())?;
        let state = GameState::for_mode(mode, deck, u64::from(seed.unwrap_or(0)));
        crate::console_log!("[zones] new game: {mode:?}");
        Ok(ZonesEngine { state })
    }

    #[wasm_bindgen(js_name = "fromState")]
    pub fn from_state(json: &str) -> Result<ZonesEngine, JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        RuleEngine::ensure_integrity(&state).map_err(to_js_error)?;
        Ok(ZonesEngine { state })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    /// 应用对端发来的快照；本地模式设置保持不变。
    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let mut state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        RuleEngine::ensure_integrity(&state).map_err(to_js_error)?;
        state.mode = self.state.mode;
        self.state = state;
        Ok(())
    }

    /// 本端当前可以代表哪一方输入。
    fn issuer(&self) -> Side {
        match self.state.mode {
            GameMode::Solo => Side::Home,
            GameMode::Hotseat => self.state.active_side,
            GameMode::Online { local } => local,
        }
    }

    pub fn start_game(&mut self) -> Result<String, JsValue> {
        let events = execute_with_engine(&mut self.state, |engine, state| engine.start_game(state))?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn select_character(&mut self, zone: u8, lane: u8) -> Result<String, JsValue> {
        let issuer = self.issuer();
        let coord = Coord::new(issuer, zone, lane);
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.select_character(state, issuer, coord)
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn select_card(&mut self, index: usize) -> Result<String, JsValue> {
        let issuer = self.issuer();
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.select_card(state, issuer, index)
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn select_target(&mut self, zone: u8, lane: u8) -> Result<String, JsValue> {
        let issuer = self.issuer();
        let coord = Coord::new(issuer.opponent(), zone, lane);
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.select_target(state, issuer, coord)
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn discard(&mut self, index: usize) -> Result<String, JsValue> {
        let issuer = self.issuer();
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.discard(state, issuer, index)
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    /// 当前展示播放完毕。
    pub fn acknowledge(&mut self) -> Result<String, JsValue> {
        let events = execute_with_engine(&mut self.state, |engine, state| engine.acknowledge(state))?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn legal_targets_json(&self) -> Result<String, JsValue> {
        let targets = RuleEngine::legal_targets(&self.state, self.issuer());
        serde_json::to_string(&targets).map_err(serde_to_js_error)
    }

    pub fn apply_ai_move(
        &mut self,
        difficulty: Option<String>,
        strategy: Option<String>,
    ) -> Result<String, JsValue> {
        let side = self.state.active_side;
        if self.state.controller(side) != Controller::Ai {
            return Err(to_js_error(RuleError::NotPlayerTurn));
        }

        let config = ai_config(difficulty.as_deref(), strategy.as_deref());
        let state_for_ai = self.state.clone();
        let mut agent = AiAgent::new(config);
        let decision = agent.decide_action(&state_for_ai, side);

        let applied = match decision.action.as_ref() {
            Some(action) => {
                let events = execute_with_engine(&mut self.state, |engine, state| {
                    apply_move(engine, state, side, action)
                })?;
                Some(resolution_from_events(&self.state, events))
            }
            None => None,
        };

        let response = AiMoveResponse { decision, applied };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    /// 延迟后计算 AI 决策，不修改当前状态。
    pub fn think_ai(
        &self,
        difficulty: Option<String>,
        strategy: Option<String>,
        delay_ms: Option<u32>,
    ) -> Promise {
        let state = self.state.clone();
        let side = state.active_side;
        let config = ai_config(difficulty.as_deref(), strategy.as_deref());
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let mut agent = AiAgent::new(config);
            let decision = agent.decide_action(&state, side);
            let json = serde_json::to_string(&decision).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }

    pub fn check_victory(&mut self) -> Result<JsValue, JsValue> {
        let outcome = RuleEngine::check_victory(&mut self.state);
        to_value(&outcome).map_err(JsValue::from)
    }
}

/// 返回一个示例对局，方便前端调试或初始化。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state() -> Result<JsValue, JsValue> {
    to_value(&GameState::sample()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "defaultDeck")]
pub fn default_deck_js() -> Result<JsValue, JsValue> {
    to_value(&default_deck()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "generateOpponentDeck")]
pub fn generate_opponent_deck_js(seed: u32) -> Result<JsValue, JsValue> {
    use rand::SeedableRng;
    let mut rng = rand::rngs::SmallRng::seed_from_u64(u64::from(seed));
    to_value(&generate_opponent_deck(&mut rng)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateDeck")]
pub fn validate_deck_js(deck: JsValue) -> Result<(), JsValue> {
    let deck: Vec<Card> = from_value(deck).map_err(JsValue::from)?;
    validate_deck(&deck).map_err(|error| to_js_error(RuleError::InvalidDeck { error }))
}

/// 对快照执行一条命令，返回新状态与事件。
#[wasm_bindgen(js_name = "applyCommand")]
pub fn apply_command(state: JsValue, issuer: u8, command: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let command: Command = from_value(command).map_err(JsValue::from)?;
    let issuer = side_from_index(issuer)?;
    let mut engine = RuleEngine::new();
    match engine.handle(&mut state, issuer, command) {
        Ok(events) => to_value(&RuleResolution::new(state, events)).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "checkVictory")]
pub fn check_victory(state: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let outcome = RuleEngine::check_victory(&mut state);
    to_value(&outcome).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    RuleEngine::ensure_integrity(&state).map_err(to_js_error)
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(
    state: JsValue,
    side: u8,
    difficulty: Option<String>,
    strategy: Option<String>,
) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let side = side_from_index(side)?;
    let mut agent = AiAgent::new(ai_config(difficulty.as_deref(), strategy.as_deref()));
    let decision = agent.decide_action(&state, side);
    to_value(&decision).map_err(JsValue::from)
}
