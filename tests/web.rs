#![cfg(target_arch = "wasm32")]

use wasm_bindgen_test::*;
use zones_core::{GamePhase, GameState, RuleResolution, ZonesEngine};

#[wasm_bindgen_test]
fn solo_game_runs_first_play_in_browser_build() {
    let mut engine = ZonesEngine::new(None, None, Some(9)).expect("engine created");
    engine.start_game().expect("game starts");
    engine.select_character(3, 0).expect("select red");

    let json = engine.select_card(0).expect("select first card");
    let resolution: RuleResolution = serde_json::from_str(&json).expect("resolution json");
    assert_ne!(resolution.state.phase, GamePhase::Setup);

    let state: GameState =
        serde_json::from_str(&engine.state_json().expect("state json")).expect("state parses");
    assert!(state.integrity_check().is_ok());
}

#[wasm_bindgen_test]
fn rejects_an_illegal_deck() {
    let deck = r#"[{"type":"Attack","value":3}]"#;
    assert!(ZonesEngine::new(None, Some(deck.to_string()), None).is_err());
}
