//! 游戏核心逻辑模块（棋盘、卡牌、状态机、效果链与规则引擎）。

pub mod board;
pub mod cards;
pub mod effects;
pub mod rules;
pub mod state;

pub use board::{Board, Character, Coord, Side, Team, LANES, MAX_CHARACTERS_PER_SIDE, ZONES};
pub use cards::{
    default_deck, generate_opponent_deck, validate_deck, Card, CardKind, CardProfile, CardRole,
    DeckError,
};
pub use effects::{
    Actor, DamageOutcome, EffectChain, EffectEngine, EffectResolution, Move, StatChange, Step,
    Subject, VisibleEffect,
};
pub use rules::{Command, RuleEngine, RuleError, RuleResolution};
pub use state::{
    Controller, GameEvent, GameMode, GamePhase, GameState, IntegrityError, RulesConfig, Selection,
    VictoryReason, VictoryState,
};
