//! Core type definitions used throughout the codebase

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

/// The four kinds of agent living on the casino floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    Player,
    Cashier,
    SlotMachine,
    Croupier,
}

impl AgentKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Player => "Player",
            Self::Cashier => "Cashier",
            Self::SlotMachine => "Slot Machine",
            Self::Croupier => "Croupier",
        }
    }
}

/// 2D position / direction on the casino floor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0001 {
            Self { x: self.x / len, y: self.y / len }
        } else {
            Self::default()
        }
    }

    pub fn dot(&self, other: &Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Unit vector pointing from `from` towards `to`
    pub fn direction(from: Self, to: Self) -> Self {
        (to - from).normalize()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self { x: self.x * rhs, y: self.y * rhs }
    }
}

/// Axis-aligned rectangle (origin + size)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Uniform integer point inside the rectangle
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        let x = rng.gen_range(self.x..self.x + self.width.max(1));
        let y = rng.gen_range(self.y..self.y + self.height.max(1));
        Vec2::new(x as f32, y as f32)
    }

    pub fn contains(&self, pos: Vec2) -> bool {
        pos.x >= self.x as f32
            && pos.x <= (self.x + self.width) as f32
            && pos.y >= self.y as f32
            && pos.y <= (self.y + self.height) as f32
    }
}

/// Named areas of the floor players walk between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    Entrance,
    Lobby,
    CashierArea,
    GameArea,
}

/// Fixed floor plan: where each zone is and where resources stand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorLayout {
    pub entrance: Vec2,
    pub lobby: Rect,
    pub cashier_area: Rect,
    pub game_area: Rect,
}

impl Default for FloorLayout {
    fn default() -> Self {
        Self {
            entrance: Vec2::new(0.0, 200.0),
            lobby: Rect::new(0, 0, 200, 200),
            cashier_area: Rect::new(0, 200, 200, 200),
            game_area: Rect::new(200, 0, 300, 400),
        }
    }
}

impl FloorLayout {
    /// Pick a destination inside `zone` (the entrance is a single point)
    pub fn destination<R: Rng + ?Sized>(&self, zone: Zone, rng: &mut R) -> Vec2 {
        match zone {
            Zone::Entrance => self.entrance,
            Zone::Lobby => self.lobby.random_point(rng),
            Zone::CashierArea => self.cashier_area.random_point(rng),
            Zone::GameArea => self.game_area.random_point(rng),
        }
    }

    /// Counter position of the 1-based cashier `n`
    pub fn cashier_position(n: usize) -> Vec2 {
        Vec2::new((n as f32 * 48.0) - 24.0, 352.0)
    }

    /// Cabinet position of the 1-based slot machine `n`
    pub fn slot_machine_position(n: usize) -> Vec2 {
        Vec2::new(192.0 + n as f32 * 48.0, 320.0)
    }

    /// Table position of the 1-based croupier `n`
    pub fn croupier_position(n: usize) -> Vec2 {
        Vec2::new(300.0, n as f32 * 64.0)
    }
}
