// Canonical display-name rendering.
//
// A display name is "<prefix> <base> <suffix>": the prefix encodes roster
// status, the suffix is the salary shown for free agents. Rendering always
// strips any previously applied prefix/suffix first, so the formatter is
// idempotent and safe to re-run on its own output.

use serde::{Deserialize, Serialize};

/// Status token rendered in front of the base name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NicknamePrefix {
    /// 2-3 letter team code, stored uppercase.
    TeamCode(String),
    FreeAgent,
    RestrictedFreeAgent,
    Spectator,
    /// Not yet eligible for the split.
    PendingEligibility,
}

impl NicknamePrefix {
    pub fn token(&self) -> &str {
        match self {
            Self::TeamCode(code) => code,
            Self::FreeAgent => "FA",
            Self::RestrictedFreeAgent => "RFA",
            Self::Spectator => "S",
            Self::PendingEligibility => "TBD",
        }
    }

    /// Whether a leading token looks like a previously applied prefix.
    fn matches_token(token: &str) -> bool {
        matches!(token, "FA" | "RFA" | "S" | "TBD") || is_team_code(token)
    }
}

/// Salary suffix shown for free agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalarySuffix {
    Amount(i64),
    /// Salary not derivable yet.
    Placeholder,
}

impl SalarySuffix {
    fn render(&self) -> String {
        match self {
            Self::Amount(v) => v.to_string(),
            Self::Placeholder => "TBD".to_string(),
        }
    }
}

/// The roster-derived state a nickname is rendered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameState {
    pub prefix: NicknamePrefix,
    pub suffix: Option<SalarySuffix>,
}

impl NameState {
    /// Derive the canonical state from roster fields.
    ///
    /// Precedence: franchise owners show their team code with no salary;
    /// spectators show "S"; players not yet eligible show "TBD"; free
    /// agents show "FA"/"RFA" plus their salary; everyone else shows their
    /// team code.
    pub fn derive(
        team: Option<&str>,
        is_owner: bool,
        is_spectator: bool,
        eligible: bool,
        restricted: bool,
        salary: Option<i64>,
    ) -> Self {
        let on_team = team.map(|t| t != "FA" && !t.is_empty()).unwrap_or(false);

        if is_owner && on_team {
            return Self {
                prefix: NicknamePrefix::TeamCode(team.unwrap_or_default().to_uppercase()),
                suffix: None,
            };
        }
        if is_spectator {
            return Self {
                prefix: NicknamePrefix::Spectator,
                suffix: None,
            };
        }
        if !eligible {
            return Self {
                prefix: NicknamePrefix::PendingEligibility,
                suffix: None,
            };
        }
        if !on_team {
            let suffix = Some(match salary {
                Some(v) if v > 0 => SalarySuffix::Amount(v),
                _ => SalarySuffix::Placeholder,
            });
            let prefix = if restricted {
                NicknamePrefix::RestrictedFreeAgent
            } else {
                NicknamePrefix::FreeAgent
            };
            return Self { prefix, suffix };
        }
        Self {
            prefix: NicknamePrefix::TeamCode(team.unwrap_or_default().to_uppercase()),
            suffix: None,
        }
    }
}

/// 2-3 uppercase ASCII letters.
fn is_team_code(token: &str) -> bool {
    (2..=3).contains(&token.len()) && token.chars().all(|c| c.is_ascii_uppercase())
}

fn is_salary_suffix(token: &str) -> bool {
    token == "TBD" || (!token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
}

/// Remove a previously applied prefix and suffix from a display name,
/// returning the bare base name. Falls back to the input if stripping
/// would leave nothing (e.g. the whole name is "TBD").
pub fn strip_name(display: &str) -> String {
    let tokens: Vec<&str> = display.split_whitespace().collect();
    if tokens.is_empty() {
        return display.trim().to_string();
    }

    let mut start = 0;
    let mut end = tokens.len();
    if end - start > 1 && NicknamePrefix::matches_token(tokens[start]) {
        start += 1;
    }
    if end - start > 1 && is_salary_suffix(tokens[end - 1]) {
        end -= 1;
    }

    let base = tokens[start..end].join(" ");
    if base.is_empty() {
        display.trim().to_string()
    } else {
        base
    }
}

/// Render the canonical display name for `state`, stripping any prefix or
/// suffix already present in `display`. Idempotent.
pub fn format_nickname(display: &str, state: &NameState) -> String {
    let base = strip_name(display);
    let mut out = format!("{} {}", state.prefix.token(), base);
    if let Some(suffix) = &state.suffix {
        out.push(' ');
        out.push_str(&suffix.render());
    }
    out
}
