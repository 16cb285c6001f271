use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::board::{Coord, Side, Team};
use super::cards::{Card, CardKind, FORCED_DEFENSE};
use super::state::{GameEvent, GamePhase, GameState};

/// 一次角色位移，供前端播放移动动画。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Move {
    pub from: Coord,
    pub to: Coord,
}

/// 效果链每一步交给前端展示的内容；展示完成后由前端确认继续。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum VisibleEffect {
    AttackTravel { from: Coord, to: Coord, team: Team },
    Hit { at: Coord, amount: i32 },
    StatPulse { at: Coord, team: Team },
    FloatingText { at: Coord, text: String },
    Movement { moves: Vec<Move> },
    Banner { text: String },
}

/// 出牌角色。区域推进会移动角色，所以按颜色而不是坐标定位。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub side: Side,
    pub team: Team,
}

impl Actor {
    pub fn locate(&self, state: &GameState) -> Option<Coord> {
        state.board.find_team(self.side, self.team)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Subject {
    Actor { actor: Actor },
    Cell { coord: Coord },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum StatChange {
    AddDefense { amount: i32 },
    SetDefense { value: i32 },
    /// 叠加嘲讽，同时清除同侧其他角色的嘲讽。
    GrantTaunt { stacks: u8 },
    ConsumeTaunt,
    AddCounter { stacks: u8 },
    SetCounter { stacks: u8 },
    SetAgility { turns: u8 },
}

/// 效果链上的一步。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op")]
pub enum Step {
    /// 暂停，等待前端展示完成。
    Present {
        effect: VisibleEffect,
    },
    Strike {
        actor: Actor,
        target: Coord,
        amount: i32,
        with_bonus: bool,
    },
    Damage {
        target: Coord,
        amount: i32,
        attacker: Side,
    },
    PushBack {
        target: Coord,
        attacker: Side,
    },
    ZoneAdvance {
        side: Side,
    },
    CheckVictory,
    SplitDefense {
        actor: Actor,
        amount: i32,
    },
    Modify {
        subject: Subject,
        change: StatChange,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Allies {
        actor: Actor,
        change: StatChange,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    EndTurn,
}

/// 正在结算的效果链。非空时即为输入锁。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectChain {
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    steps: VecDeque<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    awaiting: Option<VisibleEffect>,
}

impl EffectChain {
    pub fn is_idle(&self) -> bool {
        self.steps.is_empty() && self.awaiting.is_none()
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_idle()
    }

    pub fn awaiting(&self) -> Option<&VisibleEffect> {
        self.awaiting.as_ref()
    }

    pub fn push_back(&mut self, step: Step) {
        self.steps.push_back(step);
    }

    pub fn extend(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.steps.extend(steps);
    }

    /// 插到队首，保持给定顺序：后续步骤要等这些步骤完成才执行。
    pub fn push_front_all(&mut self, steps: Vec<Step>) {
        for step in steps.into_iter().rev() {
            self.steps.push_front(step);
        }
    }

    pub fn push_front(&mut self, step: Step) {
        self.steps.push_front(step);
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.awaiting = None;
    }

    fn pop(&mut self) -> Option<Step> {
        self.steps.pop_front()
    }

    fn acknowledge(&mut self) -> Option<VisibleEffect> {
        self.awaiting.take()
    }
}

/// 单次伤害的结果。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DamageOutcome {
    Missing,
    Deflected { amount: i32 },
    Countered { amount: i32 },
    Absorbed { defense: i32 },
    Defeated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectResolution {
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<VisibleEffect>,
}

#[derive(Debug, Default, Clone)]
pub struct EffectEngine;

impl EffectEngine {
    pub fn new() -> Self {
        Self
    }

    /// 把一张牌展开成效果步骤，卡牌数值全部取自 `Card::profile`。
    pub fn plan(&self, card: &Card, actor: Actor, origin: Coord, targets: &[Coord]) -> Vec<Step> {
        let profile = card.profile();
        let travel = |to: Coord| Step::Present {
            effect: VisibleEffect::AttackTravel {
                from: origin,
                to,
                team: actor.team,
            },
        };
        let pulse = Step::Present {
            effect: VisibleEffect::StatPulse {
                at: origin,
                team: actor.team,
            },
        };
        let on_actor = |change: StatChange, label: Option<String>| Step::Modify {
            subject: Subject::Actor { actor },
            change,
            label,
        };
        let on_cell = |coord: Coord, change: StatChange, label: Option<String>| Step::Modify {
            subject: Subject::Cell { coord },
            change,
            label,
        };
        let damage = profile.base_damage.unwrap_or(0);
        let forced = profile.self_debuff.unwrap_or(0);
        let forced_label = || Some(format!("DEF {forced}"));

        let mut steps = Vec::new();
        match card.kind() {
            CardKind::Attack | CardKind::SplitAttackDefense | CardKind::Overblast | CardKind::Agility => {
                let Some(&target) = targets.first() else {
                    return vec![Step::EndTurn];
                };
                steps.push(travel(target));
                steps.push(Step::Strike {
                    actor,
                    target,
                    amount: damage,
                    with_bonus: true,
                });
                match card.kind() {
                    CardKind::SplitAttackDefense => steps.push(Step::SplitDefense {
                        actor,
                        amount: profile.defense_boost.unwrap_or(0),
                    }),
                    CardKind::Overblast => steps.push(on_actor(
                        StatChange::SetDefense { value: forced },
                        forced_label(),
                    )),
                    CardKind::Agility => steps.push(on_actor(
                        StatChange::SetAgility { turns: 1 },
                        Some("Agility!".to_string()),
                    )),
                    _ => {}
                }
            }
            CardKind::DoubleBlast | CardKind::TripleBlast => {
                for (index, &target) in targets.iter().enumerate() {
                    steps.push(travel(target));
                    steps.push(Step::Strike {
                        actor,
                        target,
                        amount: damage,
                        with_bonus: index == 0,
                    });
                }
                if targets.len() > 1 {
                    steps.push(Step::ZoneAdvance { side: actor.side });
                }
            }
            CardKind::Defense => {
                let boost = profile.defense_boost.unwrap_or(0);
                steps.push(pulse);
                steps.push(on_actor(
                    StatChange::AddDefense { amount: boost },
                    Some(format!("+{boost}")),
                ));
            }
            CardKind::Taunt | CardKind::Fortify => {
                let boost = profile.defense_boost.unwrap_or(0);
                steps.push(pulse);
                steps.push(on_actor(StatChange::AddDefense { amount: boost }, None));
                steps.push(on_actor(
                    StatChange::GrantTaunt {
                        stacks: profile.taunt_stacks,
                    },
                    Some(format!("+{boost} Taunt")),
                ));
            }
            CardKind::Counter => {
                steps.push(pulse);
                steps.push(on_actor(
                    StatChange::AddCounter {
                        stacks: profile.counter_stacks,
                    },
                    Some("Counter".to_string()),
                ));
            }
            CardKind::CounterAssault => {
                steps.push(pulse);
                steps.push(on_actor(StatChange::SetDefense { value: forced }, None));
                steps.push(on_actor(
                    StatChange::SetCounter {
                        stacks: profile.counter_stacks,
                    },
                    Some(format!("Counter x{}", profile.counter_stacks)),
                ));
                steps.push(on_actor(
                    StatChange::GrantTaunt {
                        stacks: profile.taunt_stacks,
                    },
                    Some("Taunt!".to_string()),
                ));
            }
            CardKind::Sacrifice => {
                let boost = profile.ally_defense_boost.unwrap_or(0);
                steps.push(pulse);
                steps.push(on_actor(StatChange::SetDefense { value: forced }, forced_label()));
                steps.push(on_actor(
                    StatChange::GrantTaunt {
                        stacks: profile.taunt_stacks,
                    },
                    Some("Taunt!".to_string()),
                ));
                steps.push(Step::Allies {
                    actor,
                    change: StatChange::AddDefense { amount: boost },
                    label: Some(format!("+{boost}")),
                });
            }
            CardKind::Endeavor => {
                if let Some(&target) = targets.first() {
                    steps.push(travel(target));
                    steps.push(on_cell(target, StatChange::ConsumeTaunt, None));
                    steps.push(on_cell(
                        target,
                        StatChange::SetDefense { value: forced },
                        forced_label(),
                    ));
                    steps.push(on_actor(
                        StatChange::SetDefense { value: forced },
                        forced_label(),
                    ));
                }
            }
            CardKind::Equalize => {
                let label = Some(format!("DEF {FORCED_DEFENSE}"));
                for &target in targets {
                    steps.push(travel(target));
                    steps.push(on_cell(
                        target,
                        StatChange::SetDefense {
                            value: FORCED_DEFENSE,
                        },
                        label.clone(),
                    ));
                }
                steps.push(Step::Allies {
                    actor,
                    change: StatChange::SetDefense {
                        value: FORCED_DEFENSE,
                    },
                    label,
                });
            }
        }
        steps.push(Step::EndTurn);
        steps
    }

    /// 把步骤追加到效果链并立即推进。
    pub fn begin(&self, state: &mut GameState, steps: Vec<Step>) -> EffectResolution {
        state.chain.extend(steps);
        self.run(state)
    }

    /// 前端确认当前展示已完成，继续推进效果链。
    pub fn acknowledge(&self, state: &mut GameState) -> Option<EffectResolution> {
        state.chain.acknowledge()?;
        Some(self.run(state))
    }

    /// 执行步骤直到需要前端展示，或者链条为空。
    pub fn run(&self, state: &mut GameState) -> EffectResolution {
        let mut events = Vec::new();
        while state.chain.awaiting.is_none() {
            if state.is_finished() {
                state.chain.clear();
                break;
            }
            let Some(step) = state.chain.pop() else {
                break;
            };
            if let Some(effect) = self.execute(state, step, &mut events) {
                state.chain.awaiting = Some(effect);
            }
        }

        state.phase = if state.is_finished() {
            GamePhase::Finished
        } else if state.chain.is_in_flight() {
            GamePhase::Resolving
        } else {
            GamePhase::Main
        };

        EffectResolution {
            events,
            awaiting: state.chain.awaiting.clone(),
        }
    }

    fn emit(state: &mut GameState, events: &mut Vec<GameEvent>, event: GameEvent) {
        state.record_event(event.clone());
        events.push(event);
    }

    fn execute(
        &self,
        state: &mut GameState,
        step: Step,
        events: &mut Vec<GameEvent>,
    ) -> Option<VisibleEffect> {
        match step {
            Step::Present { effect } => Some(effect),
            Step::Strike {
                actor,
                target,
                amount,
                with_bonus,
            } => {
                state.board.get(target)?;
                let bonus = if with_bonus {
                    actor
                        .locate(state)
                        .and_then(|coord| state.board.get_mut(coord))
                        .map(|character| character.take_attack_bonus())
                        .unwrap_or(0)
                } else {
                    0
                };
                let amount = amount + bonus;
                state.chain.push_front(Step::Damage {
                    target,
                    amount,
                    attacker: actor.side,
                });
                Some(VisibleEffect::Hit { at: target, amount })
            }
            Step::Damage {
                target,
                amount,
                attacker,
            } => match self.apply_damage(state, target, amount, attacker, events) {
                DamageOutcome::Deflected { amount } => Some(VisibleEffect::FloatingText {
                    at: target,
                    text: format!("Agility! +{amount} Atk"),
                }),
                DamageOutcome::Countered { amount } => Some(VisibleEffect::FloatingText {
                    at: target,
                    text: format!("Counter! +{amount} Atk"),
                }),
                DamageOutcome::Missing | DamageOutcome::Absorbed { .. } | DamageOutcome::Defeated => {
                    None
                }
            },
            Step::PushBack { target, attacker } => self.push_back(state, target, attacker, events),
            Step::ZoneAdvance { side } => self.zone_advance(state, side, events),
            Step::CheckVictory => {
                let outcome = state.evaluate_victory()?;
                state.chain.steps.clear();
                let event = GameEvent::GameEnded {
                    winner: outcome.winner,
                    reason: outcome.reason.clone(),
                };
                events.push(event);
                crate::console_log!("[zones] {}", outcome.headline());
                Some(VisibleEffect::Banner {
                    text: outcome.headline(),
                })
            }
            Step::SplitDefense { actor, amount } => match actor.locate(state) {
                Some(coord) => {
                    state.chain.push_front(Step::Modify {
                        subject: Subject::Cell { coord },
                        change: StatChange::AddDefense { amount },
                        label: Some(format!("+{amount}")),
                    });
                    Some(VisibleEffect::StatPulse {
                        at: coord,
                        team: actor.team,
                    })
                }
                None => {
                    let text = "No Defense (KO)".to_string();
                    Self::emit(state, events, GameEvent::NoticeShown { text: text.clone() });
                    Some(VisibleEffect::Banner { text })
                }
            },
            Step::Modify {
                subject,
                change,
                label,
            } => {
                let coord = match subject {
                    Subject::Actor { actor } => actor.locate(state)?,
                    Subject::Cell { coord } => coord,
                };
                self.modify(state, coord, change, events)?;
                label.map(|text| VisibleEffect::FloatingText { at: coord, text })
            }
            Step::Allies {
                actor,
                change,
                label,
            } => {
                let origin = actor.locate(state);
                let steps = state
                    .board
                    .occupants(actor.side)
                    .into_iter()
                    .filter(|(coord, _)| Some(*coord) != origin)
                    .map(|(coord, _)| Step::Modify {
                        subject: Subject::Cell { coord },
                        change,
                        label: label.clone(),
                    })
                    .collect();
                state.chain.push_front_all(steps);
                None
            }
            Step::EndTurn => {
                let next = state.active_side.opponent();
                events.push(state.close_turn());
                if let Some(outcome) = state.evaluate_victory() {
                    state.chain.steps.clear();
                    events.push(GameEvent::GameEnded {
                        winner: outcome.winner,
                        reason: outcome.reason.clone(),
                    });
                    return Some(VisibleEffect::Banner {
                        text: outcome.headline(),
                    });
                }
                events.extend(state.open_turn(next));
                None
            }
        }
    }

    /// 对一名角色结算一次伤害。击倒后的击退与胜负检查插到效果链队首。
    pub fn apply_damage(
        &self,
        state: &mut GameState,
        target: Coord,
        amount: i32,
        attacker: Side,
        events: &mut Vec<GameEvent>,
    ) -> DamageOutcome {
        let Some(character) = state.board.get_mut(target) else {
            return DamageOutcome::Missing;
        };

        if character.is_agile() {
            character.temp_attack_bonus += amount;
            character.agility_turns = 0;
            Self::emit(state, events, GameEvent::AttackDeflected { target, amount });
            return DamageOutcome::Deflected { amount };
        }

        if character.counter_stacks > 0 {
            character.counter_stacks -= 1;
            character.temp_attack_bonus += amount;
            character.consume_taunt();
            Self::emit(state, events, GameEvent::AttackCountered { target, amount });
            return DamageOutcome::Countered { amount };
        }

        character.defense = (character.defense - amount).max(0);
        character.consume_taunt();
        let defense = character.defense;
        Self::emit(
            state,
            events,
            GameEvent::DamageApplied {
                target,
                amount,
                defense,
            },
        );

        if defense == 0 {
            state.chain.push_front_all(vec![
                Step::CheckVictory,
                Step::PushBack { target, attacker },
            ]);
            DamageOutcome::Defeated
        } else {
            DamageOutcome::Absorbed { defense }
        }
    }

    fn push_back(
        &self,
        state: &mut GameState,
        target: Coord,
        attacker: Side,
        events: &mut Vec<GameEvent>,
    ) -> Option<VisibleEffect> {
        let character = state.board.get(target).copied()?;

        let Some(zone) = target.side.step_back(target.zone) else {
            state.board.take(target);
            state.knockouts[target.side.index()] += 1;
            let knockouts = state.knockouts(target.side);
            Self::emit(
                state,
                events,
                GameEvent::KnockedOut {
                    coord: target,
                    knockouts,
                },
            );
            state.chain.push_front_all(vec![
                Step::CheckVictory,
                Step::ZoneAdvance { side: attacker },
            ]);
            return Some(VisibleEffect::Banner {
                text: "Knock Out".to_string(),
            });
        };

        let rebounded = character.rebounded(state.config.rebound_defense);
        let destination = target.with_zone(zone);
        // 目标格被占用时（只可能来自外部快照）原地重置。
        let destination = if state.board.get(destination).is_some() {
            target
        } else {
            destination
        };
        state.board.take(target);
        state.board.set(destination, Some(rebounded));
        Self::emit(
            state,
            events,
            GameEvent::PushedBack {
                from: target,
                to: destination,
                character: rebounded,
            },
        );
        state.chain.push_front(Step::ZoneAdvance { side: attacker });
        Some(VisibleEffect::Movement {
            moves: vec![Move {
                from: target,
                to: destination,
            }],
        })
    }

    /// 双方最前线之间出现完全空的区域时，`side` 的全部角色前进一格。
    fn zone_advance(
        &self,
        state: &mut GameState,
        side: Side,
        events: &mut Vec<GameEvent>,
    ) -> Option<VisibleEffect> {
        let own = state.board.most_forward_zone(side)?;
        let enemy = state.board.most_forward_zone(side.opponent())?;
        let (low, high) = (own.min(enemy), own.max(enemy));
        let gap = (low + 1..high).any(|zone| state.board.is_zone_empty(zone));
        if !gap {
            return None;
        }

        let moves: Vec<Move> = state
            .board
            .occupants(side)
            .into_iter()
            .filter_map(|(coord, _)| {
                side.step_forward(coord.zone).map(|zone| Move {
                    from: coord,
                    to: coord.with_zone(zone),
                })
            })
            .collect();
        if moves.is_empty() {
            return None;
        }

        let moved: Vec<_> = moves
            .iter()
            .filter_map(|step| state.board.take(step.from).map(|character| (step.to, character)))
            .collect();
        for (coord, character) in moved {
            state.board.set(coord, Some(character));
        }

        Self::emit(
            state,
            events,
            GameEvent::ZoneAdvanced {
                side,
                moves: moves.clone(),
            },
        );
        state.chain.push_front(Step::Present {
            effect: VisibleEffect::Movement { moves },
        });
        Some(VisibleEffect::Banner {
            text: "Zone Advance".to_string(),
        })
    }

    fn modify(
        &self,
        state: &mut GameState,
        coord: Coord,
        change: StatChange,
        events: &mut Vec<GameEvent>,
    ) -> Option<()> {
        if let StatChange::GrantTaunt { .. } = change {
            state.board.clear_taunts_except(coord.side, coord);
        }
        let character = state.board.get_mut(coord)?;
        match change {
            StatChange::AddDefense { amount } => character.defense += amount,
            StatChange::SetDefense { value } => character.defense = value,
            StatChange::GrantTaunt { stacks } => {
                character.taunt_stacks = character.taunt_stacks.saturating_add(stacks)
            }
            StatChange::ConsumeTaunt => character.consume_taunt(),
            StatChange::AddCounter { stacks } => {
                character.counter_stacks = character.counter_stacks.saturating_add(stacks)
            }
            StatChange::SetCounter { stacks } => character.counter_stacks = stacks,
            StatChange::SetAgility { turns } => character.agility_turns = turns,
        }
        let character = *character;
        Self::emit(
            state,
            events,
            GameEvent::CharacterUpdated { coord, character },
        );
        Some(())
    }
}
