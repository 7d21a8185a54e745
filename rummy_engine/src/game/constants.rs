/// Cards dealt to every seat at the start of a round.
pub const DEFAULT_HAND_SIZE: usize = 13;

/// Standard 52-card decks shuffled together per round.
pub const DEFAULT_DECK_COUNT: u8 = 2;

/// Printed jokers added on top of the standard decks.
pub const DEFAULT_PRINTED_JOKERS: u8 = 2;

pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 6;

pub const DEFAULT_FACE_POINTS: u32 = 10;
pub const DEFAULT_MAX_POINTS: u32 = 80;
pub const DEFAULT_FIRST_DROP: u32 = 20;
pub const DEFAULT_MIDDLE_DROP: u32 = 40;

pub const DEFAULT_MIN_PURE_SEQUENCES: usize = 1;
pub const DEFAULT_MIN_SEQUENCES: usize = 2;

pub const DEFAULT_DEALS_COUNT: u32 = 2;
pub const DEFAULT_POOL_THRESHOLD: u32 = 101;

pub const DEFAULT_MAX_MISSED_TURNS: u32 = 3;
