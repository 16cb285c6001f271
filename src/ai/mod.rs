//! AI 出牌策略。

pub mod search;

pub use search::{
    apply_move, enumerate_candidates, AiAgent, AiConfig, AiDecision, AiDifficulty, AiMove,
    AiStrategy, Candidate,
};
