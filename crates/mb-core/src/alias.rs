//! # Anonymous Aliases
//!
//! Deterministic pseudonyms ("행복한 고양이 3") derived from a per-scope seed,
//! and the per-board policy that decides whether an author is shown under
//! their alias or their entered name.
//!
//! Nothing here is stored: the same seed always yields the same alias, so the
//! alias is recomputed whenever it is needed.

use crate::models::AnonymityMode;

/// Shown when there is no identity to derive an alias from.
pub const ANONYMOUS_PLACEHOLDER: &str = "익명";

/// Shown when a name is required but none was entered.
pub const NAME_PLACEHOLDER: &str = "사용자";

pub const ADJECTIVES: [&str; 10] = [
    "행복한",
    "용감한",
    "조용한",
    "빠른",
    "따뜻한",
    "신비한",
    "졸린",
    "귀여운",
    "씩씩한",
    "다정한",
];

pub const ANIMALS: [&str; 10] = [
    "고양이",
    "강아지",
    "토끼",
    "여우",
    "곰",
    "판다",
    "다람쥐",
    "펭귄",
    "수달",
    "부엉이",
];

/// Polynomial string hash (`h = h * 31 + unit`) over UTF-16 code units,
/// wrapping at 32 bits.
pub fn seed_hash(seed: &str) -> u32 {
    seed.encode_utf16()
        .fold(0u32, |acc, unit| acc.wrapping_mul(31).wrapping_add(u32::from(unit)))
}

/// Builds the alias for an already computed hash.
///
/// Every `u32` maps to an in-range vocabulary entry; the shift is unsigned.
pub fn alias_from_hash(hash: u32) -> String {
    let adjective = ADJECTIVES[(hash % 10) as usize];
    let animal = ANIMALS[((hash >> 8) % 10) as usize];
    let digit = hash % 9 + 1;
    format!("{adjective} {animal} {digit}")
}

/// Generates the alias for a seed. `None` or an empty seed yields
/// [`ANONYMOUS_PLACEHOLDER`].
pub fn generate_alias(seed: Option<&str>) -> String {
    match seed {
        Some(seed) if !seed.is_empty() => alias_from_hash(seed_hash(seed)),
        _ => ANONYMOUS_PLACEHOLDER.to_string(),
    }
}

/// Scope seed for a user: `"{id}:group:{g}"`, else `"{id}:board:{b}"`, else
/// the bare id. Group scope wins when both are set.
pub fn alias_seed(user_id: Option<&str>, board_id: Option<i64>, group_id: Option<i64>) -> Option<String> {
    let id = user_id.filter(|id| !id.is_empty())?;
    Some(match (group_id, board_id) {
        (Some(group_id), _) => format!("{id}:group:{group_id}"),
        (None, Some(board_id)) => format!("{id}:board:{board_id}"),
        (None, None) => id.to_string(),
    })
}

/// Inputs to [`resolve_display_name`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayNameParams<'a> {
    pub mode: AnonymityMode,
    /// Name as typed by the author; may be blank.
    pub raw_name: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub board_id: Option<i64>,
    pub group_id: Option<i64>,
    /// Only consulted under [`AnonymityMode::AllowChoice`].
    pub want_name_shown: bool,
}

impl<'a> DisplayNameParams<'a> {
    pub fn new(mode: AnonymityMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn raw_name(mut self, name: &'a str) -> Self {
        self.raw_name = Some(name);
        self
    }

    pub fn user(mut self, user_id: &'a str) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn board(mut self, board_id: i64) -> Self {
        self.board_id = Some(board_id);
        self
    }

    pub fn group(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn show_name(mut self, show: bool) -> Self {
        self.want_name_shown = show;
        self
    }
}

/// What an author will be shown as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDisplay {
    pub is_anonymous: bool,
    pub display_name: String,
}

impl ResolvedDisplay {
    fn anonymous(seed: Option<&str>) -> Self {
        Self {
            is_anonymous: true,
            display_name: generate_alias(seed),
        }
    }

    fn named(raw_name: Option<&str>) -> Self {
        let name = raw_name.map(str::trim).filter(|n| !n.is_empty());
        Self {
            is_anonymous: false,
            display_name: name.unwrap_or(NAME_PLACEHOLDER).to_string(),
        }
    }
}

/// Applies the anonymity policy. Total: every input has a defined result.
pub fn resolve_display_name(params: &DisplayNameParams<'_>) -> ResolvedDisplay {
    let seed = alias_seed(params.user_id, params.board_id, params.group_id);
    match params.mode {
        AnonymityMode::AlwaysAnon => ResolvedDisplay::anonymous(seed.as_deref()),
        AnonymityMode::RequireName => ResolvedDisplay::named(params.raw_name),
        AnonymityMode::AllowChoice => {
            let has_name = params.raw_name.is_some_and(|n| !n.trim().is_empty());
            if params.want_name_shown && has_name {
                ResolvedDisplay::named(params.raw_name)
            } else {
                ResolvedDisplay::anonymous(seed.as_deref())
            }
        }
    }
}
