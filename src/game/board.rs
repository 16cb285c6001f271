use serde::{Deserialize, Serialize};

/// 赛道上的区域（行）数量。
pub const ZONES: usize = 6;
/// 每个区域的通道（列）数量。
pub const LANES: usize = 3;
/// 每方角色上限，每个颜色各一名。
pub const MAX_CHARACTERS_PER_SIDE: usize = 3;

/// 对战双方。Home 从 3 区出发向 0 区推进，Away 从 2 区出发向 5 区推进。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Home, Side::Away];

    pub fn index(self) -> usize {
        match self {
            Side::Home => 0,
            Side::Away => 1,
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }

    pub fn start_zone(self) -> u8 {
        match self {
            Side::Home => 3,
            Side::Away => 2,
        }
    }

    /// 向对手方向前进一格后的区域；越界时返回 `None`。
    pub fn step_forward(self, zone: u8) -> Option<u8> {
        match self {
            Side::Home => zone.checked_sub(1),
            Side::Away => (zone + 1 < ZONES as u8).then_some(zone + 1),
        }
    }

    /// 向己方底线后退一格后的区域；越界时返回 `None`。
    pub fn step_back(self, zone: u8) -> Option<u8> {
        self.opponent().step_forward(zone)
    }

    /// `a` 是否比 `b` 更靠前。
    pub fn is_ahead(self, a: u8, b: u8) -> bool {
        match self {
            Side::Home => a < b,
            Side::Away => a > b,
        }
    }

    /// 相对出发线前进的格数，可为负。
    pub fn zones_advanced(self, zone: u8) -> i32 {
        match self {
            Side::Home => i32::from(self.start_zone()) - i32::from(zone),
            Side::Away => i32::from(zone) - i32::from(self.start_zone()),
        }
    }
}

/// 角色颜色，同时决定被击退时的反弹增益。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Green,
    Blue,
}

impl Team {
    pub const ALL: [Team; 3] = [Team::Red, Team::Green, Team::Blue];

    pub fn index(self) -> usize {
        match self {
            Team::Red => 0,
            Team::Green => 1,
            Team::Blue => 2,
        }
    }

    /// 被击退后获得的 (临时攻击, 防御) 增益。
    pub fn rebound_bonus(self) -> (i32, i32) {
        match self {
            Team::Red => (2, 0),
            Team::Green => (0, 2),
            Team::Blue => (1, 1),
        }
    }
}

/// 棋盘坐标 `(side, zone, lane)`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Coord {
    pub side: Side,
    pub zone: u8,
    pub lane: u8,
}

impl Coord {
    pub fn new(side: Side, zone: u8, lane: u8) -> Self {
        Self { side, zone, lane }
    }

    pub fn is_valid(&self) -> bool {
        usize::from(self.zone) < ZONES && usize::from(self.lane) < LANES
    }

    pub fn with_zone(self, zone: u8) -> Self {
        Self { zone, ..self }
    }
}

/// 棋盘上的角色。身份由所在格子决定，移动时在新格子生成新值。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Character {
    pub team: Team,
    pub defense: i32,
    #[serde(default)]
    pub temp_attack_bonus: i32,
    #[serde(default)]
    pub taunt_stacks: u8,
    #[serde(default)]
    pub agility_turns: u8,
    #[serde(default)]
    pub counter_stacks: u8,
}

impl Character {
    pub fn new(team: Team, defense: i32) -> Self {
        Self {
            team,
            defense,
            temp_attack_bonus: 0,
            taunt_stacks: 0,
            agility_turns: 0,
            counter_stacks: 0,
        }
    }

    pub fn is_agile(&self) -> bool {
        self.agility_turns > 0
    }

    pub fn is_taunting(&self) -> bool {
        self.taunt_stacks > 0
    }

    pub fn take_attack_bonus(&mut self) -> i32 {
        std::mem::take(&mut self.temp_attack_bonus)
    }

    /// 被攻击（包括被反击抵消）时消耗一层嘲讽。
    pub fn consume_taunt(&mut self) {
        self.taunt_stacks = self.taunt_stacks.saturating_sub(1);
    }

    /// 击退后在新格子生成的角色：防御重置并附加颜色增益。
    pub fn rebounded(&self, base_defense: i32) -> Self {
        let (attack, defense) = self.team.rebound_bonus();
        Self {
            defense: base_defense + defense,
            temp_attack_bonus: self.temp_attack_bonus + attack,
            ..*self
        }
    }
}

/// 2 × 6 × 3 的棋盘，每格至多一名角色。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Board {
    cells: [[[Option<Character>; LANES]; ZONES]; 2],
}

impl Board {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 开局布置：Home 三名角色在 3 区，Away 三名角色在 2 区，按颜色分占三条通道。
    pub fn starting(defense: i32) -> Self {
        let mut board = Self::empty();
        for side in Side::ALL {
            for team in Team::ALL {
                let coord = Coord::new(side, side.start_zone(), team.index() as u8);
                board.set(coord, Some(Character::new(team, defense)));
            }
        }
        board
    }

    pub fn get(&self, coord: Coord) -> Option<&Character> {
        if !coord.is_valid() {
            return None;
        }
        self.cells[coord.side.index()][usize::from(coord.zone)][usize::from(coord.lane)].as_ref()
    }

    pub fn get_mut(&mut self, coord: Coord) -> Option<&mut Character> {
        if !coord.is_valid() {
            return None;
        }
        self.cells[coord.side.index()][usize::from(coord.zone)][usize::from(coord.lane)].as_mut()
    }

    pub fn set(&mut self, coord: Coord, character: Option<Character>) {
        if coord.is_valid() {
            self.cells[coord.side.index()][usize::from(coord.zone)][usize::from(coord.lane)] =
                character;
        }
    }

    pub fn take(&mut self, coord: Coord) -> Option<Character> {
        if !coord.is_valid() {
            return None;
        }
        self.cells[coord.side.index()][usize::from(coord.zone)][usize::from(coord.lane)].take()
    }

    /// 按区域、通道顺序列出一方的所有角色。
    pub fn occupants(&self, side: Side) -> Vec<(Coord, Character)> {
        let mut found = Vec::new();
        for (zone, row) in self.cells[side.index()].iter().enumerate() {
            for (lane, cell) in row.iter().enumerate() {
                if let Some(character) = cell {
                    found.push((Coord::new(side, zone as u8, lane as u8), *character));
                }
            }
        }
        found
    }

    pub fn count(&self, side: Side) -> usize {
        self.cells[side.index()]
            .iter()
            .flatten()
            .filter(|cell| cell.is_some())
            .count()
    }

    pub fn zone_count(&self, side: Side, zone: u8) -> usize {
        self.cells[side.index()]
            .get(usize::from(zone))
            .map(|row| row.iter().filter(|cell| cell.is_some()).count())
            .unwrap_or(0)
    }

    /// 整个区域（双方）是否没有任何角色。
    pub fn is_zone_empty(&self, zone: u8) -> bool {
        Side::ALL
            .iter()
            .all(|side| self.zone_count(*side, zone) == 0)
    }

    /// 一方最靠前的有人区域：Home 取最小区号，Away 取最大区号。
    pub fn most_forward_zone(&self, side: Side) -> Option<u8> {
        Self::forward_of(side, self.occupants(side).iter().map(|(coord, _)| coord.zone))
    }

    /// 在给定的区号中挑出 `side` 视角下最靠前的一个。
    pub fn forward_of(side: Side, zones: impl IntoIterator<Item = u8>) -> Option<u8> {
        zones.into_iter().fold(None, |best, zone| match best {
            Some(current) if !side.is_ahead(zone, current) => Some(current),
            _ => Some(zone),
        })
    }

    pub fn find_team(&self, side: Side, team: Team) -> Option<Coord> {
        self.occupants(side)
            .into_iter()
            .find(|(_, character)| character.team == team)
            .map(|(coord, _)| coord)
    }

    /// 当前带嘲讽的角色（每方至多一名）。
    pub fn taunting(&self, side: Side) -> Option<Coord> {
        self.occupants(side)
            .into_iter()
            .find(|(_, character)| character.is_taunting())
            .map(|(coord, _)| coord)
    }

    /// 可以被攻击类效果选中的角色（排除敏捷状态）。
    pub fn targetable(&self, side: Side) -> Vec<(Coord, Character)> {
        self.occupants(side)
            .into_iter()
            .filter(|(_, character)| !character.is_agile())
            .collect()
    }

    /// 清除 `side` 上除 `keep` 以外所有角色的嘲讽层数。
    pub fn clear_taunts_except(&mut self, side: Side, keep: Coord) {
        for (coord, _) in self.occupants(side) {
            if coord != keep {
                if let Some(character) = self.get_mut(coord) {
                    character.taunt_stacks = 0;
                }
            }
        }
    }

    /// 角色是否位于己方底线（再被击退即出局）。
    pub fn is_back_edge(coord: Coord) -> bool {
        coord.side.step_back(coord.zone).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_board_places_three_per_side() {
        let board = Board::starting(5);
        assert_eq!(board.count(Side::Home), 3);
        assert_eq!(board.count(Side::Away), 3);
        assert_eq!(board.zone_count(Side::Home, 3), 3);
        assert_eq!(board.zone_count(Side::Away, 2), 3);
        let blue = board
            .find_team(Side::Away, Team::Blue)
            .expect("blue should be placed");
        assert_eq!(blue, Coord::new(Side::Away, 2, 2));
    }

    #[test]
    fn forward_is_direction_relative() {
        let mut board = Board::empty();
        board.set(Coord::new(Side::Home, 4, 0), Some(Character::new(Team::Red, 5)));
        board.set(Coord::new(Side::Home, 2, 1), Some(Character::new(Team::Green, 5)));
        board.set(Coord::new(Side::Away, 0, 0), Some(Character::new(Team::Red, 5)));
        board.set(Coord::new(Side::Away, 1, 2), Some(Character::new(Team::Blue, 5)));

        assert_eq!(board.most_forward_zone(Side::Home), Some(2));
        assert_eq!(board.most_forward_zone(Side::Away), Some(1));
        assert_eq!(Board::empty().most_forward_zone(Side::Away), None);
    }

    #[test]
    fn steps_respect_track_edges() {
        assert_eq!(Side::Home.step_back(5), None);
        assert_eq!(Side::Home.step_back(3), Some(4));
        assert_eq!(Side::Away.step_back(0), None);
        assert_eq!(Side::Away.step_forward(5), None);
        assert!(Board::is_back_edge(Coord::new(Side::Home, 5, 1)));
        assert!(Board::is_back_edge(Coord::new(Side::Away, 0, 1)));
        assert!(!Board::is_back_edge(Coord::new(Side::Away, 2, 1)));
    }

    #[test]
    fn rebound_applies_team_bonus() {
        let mut red = Character::new(Team::Red, 0);
        red.taunt_stacks = 1;
        let red = red.rebounded(5);
        assert_eq!((red.defense, red.temp_attack_bonus, red.taunt_stacks), (5, 2, 1));

        let green = Character::new(Team::Green, 0).rebounded(5);
        assert_eq!((green.defense, green.temp_attack_bonus), (7, 0));

        let blue = Character::new(Team::Blue, 0).rebounded(5);
        assert_eq!((blue.defense, blue.temp_attack_bonus), (6, 1));
    }

    #[test]
    fn invalid_coordinates_are_ignored() {
        let mut board = Board::starting(5);
        let outside = Coord::new(Side::Home, 9, 0);
        assert!(board.get(outside).is_none());
        board.set(outside, Some(Character::new(Team::Red, 1)));
        assert_eq!(board.count(Side::Home), 3);
    }
}
