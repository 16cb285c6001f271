use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const OVERBLAST_DAMAGE: i32 = 50;
pub const AGILITY_DAMAGE: i32 = 5;
pub const FORTIFY_DEFENSE: i32 = 10;
pub const FORTIFY_TAUNT: u8 = 2;
pub const SACRIFICE_ALLY_DEFENSE: i32 = 5;
/// 被强制设定防御的卡牌（Overblast、Endeavor 等）使用的值。
pub const FORCED_DEFENSE: i32 = 1;

pub const SPLIT_CARDS_PER_DECK: usize = 10;
pub const ABILITY_CARDS_PER_DECK: usize = 10;
pub const MAX_ABILITY_COPIES: usize = 2;

/// 卡牌本体。手牌与牌库中的卡牌不带颜色标记。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Card {
    Attack { value: i32 },
    Defense { value: i32 },
    SplitAttackDefense { attack: i32, defense: i32 },
    DoubleBlast { value: i32 },
    TripleBlast { value: i32 },
    Taunt { value: i32 },
    Overblast,
    Fortify,
    Counter,
    CounterAssault { value: i32 },
    Agility,
    Sacrifice,
    Endeavor,
    Equalize,
}

/// 不带参数的卡牌种类，用于计数与分类。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CardKind {
    Attack,
    Defense,
    SplitAttackDefense,
    DoubleBlast,
    TripleBlast,
    Taunt,
    Overblast,
    Fortify,
    Counter,
    CounterAssault,
    Agility,
    Sacrifice,
    Endeavor,
    Equalize,
}

impl CardKind {
    /// 组卡时可选的技能卡种类。
    pub const ABILITIES: [CardKind; 11] = [
        CardKind::DoubleBlast,
        CardKind::TripleBlast,
        CardKind::Taunt,
        CardKind::Overblast,
        CardKind::Fortify,
        CardKind::Counter,
        CardKind::CounterAssault,
        CardKind::Agility,
        CardKind::Sacrifice,
        CardKind::Endeavor,
        CardKind::Equalize,
    ];

    /// 以目录中的标准数值构造卡牌。
    pub fn standard_card(self) -> Card {
        match self {
            CardKind::Attack => Card::Attack { value: 1 },
            CardKind::Defense => Card::Defense { value: 1 },
            CardKind::SplitAttackDefense => Card::SplitAttackDefense {
                attack: 3,
                defense: 3,
            },
            CardKind::DoubleBlast => Card::DoubleBlast { value: 3 },
            CardKind::TripleBlast => Card::TripleBlast { value: 2 },
            CardKind::Taunt => Card::Taunt { value: 5 },
            CardKind::Overblast => Card::Overblast,
            CardKind::Fortify => Card::Fortify,
            CardKind::Counter => Card::Counter,
            CardKind::CounterAssault => Card::CounterAssault { value: 2 },
            CardKind::Agility => Card::Agility,
            CardKind::Sacrifice => Card::Sacrifice,
            CardKind::Endeavor => Card::Endeavor,
            CardKind::Equalize => Card::Equalize,
        }
    }
}

/// 卡牌的效果参数，效果解析器只读取这里的数值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardProfile {
    pub base_damage: Option<i32>,
    pub defense_boost: Option<i32>,
    pub target_count: u8,
    pub self_debuff: Option<i32>,
    pub taunt_stacks: u8,
    pub counter_stacks: u8,
    pub ally_defense_boost: Option<i32>,
}

/// 搜索与可出牌判断使用的粗分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardRole {
    /// 只作用于出牌角色自身。
    SelfBuff,
    /// 单体攻击（含 Endeavor）。
    SingleTarget,
    /// 多目标（DoubleBlast/TripleBlast/Equalize）。
    MultiTarget,
}

impl Card {
    pub fn kind(&self) -> CardKind {
        match self {
            Card::Attack { .. } => CardKind::Attack,
            Card::Defense { .. } => CardKind::Defense,
            Card::SplitAttackDefense { .. } => CardKind::SplitAttackDefense,
            Card::DoubleBlast { .. } => CardKind::DoubleBlast,
            Card::TripleBlast { .. } => CardKind::TripleBlast,
            Card::Taunt { .. } => CardKind::Taunt,
            Card::Overblast => CardKind::Overblast,
            Card::Fortify => CardKind::Fortify,
            Card::Counter => CardKind::Counter,
            Card::CounterAssault { .. } => CardKind::CounterAssault,
            Card::Agility => CardKind::Agility,
            Card::Sacrifice => CardKind::Sacrifice,
            Card::Endeavor => CardKind::Endeavor,
            Card::Equalize => CardKind::Equalize,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind() {
            CardKind::Attack => "Attack",
            CardKind::Defense => "Defense",
            CardKind::SplitAttackDefense => "Attack/Defense",
            CardKind::DoubleBlast => "Double Blast",
            CardKind::TripleBlast => "Triple Blast",
            CardKind::Taunt => "Taunt",
            CardKind::Overblast => "Overblast",
            CardKind::Fortify => "Fortify",
            CardKind::Counter => "Counter",
            CardKind::CounterAssault => "Counter Assault",
            CardKind::Agility => "Agility",
            CardKind::Sacrifice => "Sacrifice",
            CardKind::Endeavor => "Endeavor",
            CardKind::Equalize => "Equalize",
        }
    }

    pub fn profile(&self) -> CardProfile {
        let none = CardProfile::default();
        match *self {
            Card::Attack { value } => CardProfile {
                base_damage: Some(value),
                target_count: 1,
                ..none
            },
            Card::Defense { value } => CardProfile {
                defense_boost: Some(value),
                ..none
            },
            Card::SplitAttackDefense { attack, defense } => CardProfile {
                base_damage: Some(attack),
                defense_boost: Some(defense),
                target_count: 1,
                ..none
            },
            Card::DoubleBlast { value } => CardProfile {
                base_damage: Some(value),
                target_count: 2,
                ..none
            },
            Card::TripleBlast { value } => CardProfile {
                base_damage: Some(value),
                target_count: 3,
                ..none
            },
            Card::Taunt { value } => CardProfile {
                defense_boost: Some(value),
                taunt_stacks: 1,
                ..none
            },
            Card::Overblast => CardProfile {
                base_damage: Some(OVERBLAST_DAMAGE),
                target_count: 1,
                self_debuff: Some(FORCED_DEFENSE),
                ..none
            },
            Card::Fortify => CardProfile {
                defense_boost: Some(FORTIFY_DEFENSE),
                taunt_stacks: FORTIFY_TAUNT,
                ..none
            },
            Card::Counter => CardProfile {
                counter_stacks: 1,
                ..none
            },
            Card::CounterAssault { value } => CardProfile {
                self_debuff: Some(FORCED_DEFENSE),
                taunt_stacks: 1,
                counter_stacks: u8::try_from(value.max(0)).unwrap_or(u8::MAX),
                ..none
            },
            Card::Agility => CardProfile {
                base_damage: Some(AGILITY_DAMAGE),
                target_count: 1,
                ..none
            },
            Card::Sacrifice => CardProfile {
                self_debuff: Some(FORCED_DEFENSE),
                taunt_stacks: 1,
                ally_defense_boost: Some(SACRIFICE_ALLY_DEFENSE),
                ..none
            },
            Card::Endeavor => CardProfile {
                target_count: 1,
                self_debuff: Some(FORCED_DEFENSE),
                ..none
            },
            Card::Equalize => CardProfile {
                target_count: 2,
                ..none
            },
        }
    }

    pub fn role(&self) -> CardRole {
        match self.profile().target_count {
            0 => CardRole::SelfBuff,
            1 => CardRole::SingleTarget,
            _ => CardRole::MultiTarget,
        }
    }

    pub fn requires_target(&self) -> bool {
        self.role() != CardRole::SelfBuff
    }

    pub fn is_ability(&self) -> bool {
        CardKind::ABILITIES.contains(&self.kind())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DeckError {
    WrongSplitCount { expected: usize, actual: usize },
    WrongAbilityCount { expected: usize, actual: usize },
    TooManyCopies { kind: CardKind, count: usize },
    DisallowedCard { kind: CardKind },
}

fn split_cards() -> Vec<Card> {
    (1..=5)
        .flat_map(|attack| {
            let card = Card::SplitAttackDefense {
                attack,
                defense: 6 - attack,
            };
            [card, card]
        })
        .collect()
}

static DEFAULT_DECK: Lazy<Vec<Card>> = Lazy::new(|| {
    let mut deck = split_cards();
    deck.extend([
        Card::DoubleBlast { value: 3 },
        Card::DoubleBlast { value: 3 },
        Card::TripleBlast { value: 2 },
        Card::TripleBlast { value: 2 },
        Card::Taunt { value: 5 },
        Card::Agility,
        Card::Overblast,
        Card::Fortify,
        Card::Counter,
        Card::CounterAssault { value: 2 },
        Card::Sacrifice,
        Card::Endeavor,
        Card::Equalize,
    ]);
    deck
});

/// 默认牌组：10 张攻防分配卡加全部技能卡。
pub fn default_deck() -> Vec<Card> {
    DEFAULT_DECK.clone()
}

/// 电脑方牌组：10 张攻防分配卡，再随机抽 10 张技能卡（同种至多 2 张）。
pub fn generate_opponent_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck = split_cards();
    let mut counts = [0usize; CardKind::ABILITIES.len()];
    for _ in 0..ABILITY_CARDS_PER_DECK {
        let available: Vec<usize> = (0..CardKind::ABILITIES.len())
            .filter(|index| counts[*index] < MAX_ABILITY_COPIES)
            .collect();
        let Some(&pick) = available.choose(rng) else {
            break;
        };
        counts[pick] += 1;
        deck.push(CardKind::ABILITIES[pick].standard_card());
    }
    deck
}

/// 组卡规则校验。
pub fn validate_deck(cards: &[Card]) -> Result<(), DeckError> {
    let splits = cards
        .iter()
        .filter(|card| card.kind() == CardKind::SplitAttackDefense)
        .count();
    if splits != SPLIT_CARDS_PER_DECK {
        return Err(DeckError::WrongSplitCount {
            expected: SPLIT_CARDS_PER_DECK,
            actual: splits,
        });
    }

    if let Some(card) = cards
        .iter()
        .find(|card| matches!(card.kind(), CardKind::Attack | CardKind::Defense))
    {
        return Err(DeckError::DisallowedCard { kind: card.kind() });
    }

    let abilities = cards.iter().filter(|card| card.is_ability()).count();
    if abilities != ABILITY_CARDS_PER_DECK {
        return Err(DeckError::WrongAbilityCount {
            expected: ABILITY_CARDS_PER_DECK,
            actual: abilities,
        });
    }

    for kind in CardKind::ABILITIES {
        let count = cards.iter().filter(|card| card.kind() == kind).count();
        if count > MAX_ABILITY_COPIES {
            return Err(DeckError::TooManyCopies { kind, count });
        }
    }
    Ok(())
}
