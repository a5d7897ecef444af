//! Keyword heuristics that flag potentially medical transactions.
//!
//! Matching is case-insensitive substring containment with no word-boundary
//! anchoring, so keywords are chosen to be specific enough to avoid obvious
//! collisions. Known precision limitation: a keyword can still fire inside an
//! unrelated merchant name.

use std::str::FromStr;

use regex::Regex;
use rusqlite::Connection;

use crate::error::{CareError, Result};
use crate::models::ExpenseCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Contains,
    StartsWith,
    Regex,
}

impl MatchType {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::Regex => "regex",
        }
    }
}

impl FromStr for MatchType {
    type Err = CareError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "contains" => Ok(Self::Contains),
            "starts_with" => Ok(Self::StartsWith),
            "regex" => Ok(Self::Regex),
            other => Err(CareError::Validation(format!("unknown match type '{other}'"))),
        }
    }
}

pub struct KeywordGroup {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub category: ExpenseCategory,
}

/// Evaluated in order; the first group with a matching keyword wins.
pub const KEYWORD_GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        name: "pharmacy",
        keywords: &[
            "pharmacy", "cvs", "walgreens", "rite aid", "duane reade", "express scripts",
            "optum rx", "caremark", "drugstore", "apothecary",
        ],
        category: ExpenseCategory::Pharmacy,
    },
    KeywordGroup {
        name: "transportation",
        keywords: &[
            "uber", "lyft", "taxi", "paratransit", "medical transport", "ambulance",
            "access-a-ride", "wheelchair van",
        ],
        category: ExpenseCategory::Transportation,
    },
    KeywordGroup {
        name: "doctor",
        keywords: &[
            "doctor", "hospital", "clinic", "medical center", "medical group", "physician",
            "urgent care", "labcorp", "quest diagnostics", "radiology", "physical therapy",
            "cardiology", "oncology", "pediatrics", "dermatology", "neurology",
        ],
        category: ExpenseCategory::Medical,
    },
    KeywordGroup {
        name: "in_home_care",
        keywords: &[
            "home care", "homecare", "home health", "nursing", "caregiver", "hospice",
            "assisted living", "adult day", "respite", "home instead", "visiting angels",
        ],
        category: ExpenseCategory::HomeCare,
    },
    KeywordGroup {
        name: "dental_vision",
        keywords: &[
            "dental", "dentist", "orthodont", "optometr", "ophthalm", "eye care",
            "eyecare", "lenscrafters", "vision center", "optical",
        ],
        category: ExpenseCategory::DentalVision,
    },
    KeywordGroup {
        name: "insurance",
        keywords: &[
            "health insurance", "medicare", "medicaid", "blue cross", "blue shield", "aetna",
            "cigna", "humana", "unitedhealth", "kaiser",
        ],
        category: ExpenseCategory::Insurance,
    },
];

// Substrings inspected in the provider category when no keyword matches.
const CATEGORY_HINTS: &[(&str, ExpenseCategory)] = &[
    ("medical", ExpenseCategory::Medical),
    ("transport", ExpenseCategory::Transportation),
    ("pharmacy", ExpenseCategory::Pharmacy),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_potential_medical: bool,
    pub suggested_category: ExpenseCategory,
}

impl Classification {
    fn medical(category: ExpenseCategory) -> Self {
        Self {
            is_potential_medical: true,
            suggested_category: category,
        }
    }

    fn other() -> Self {
        Self {
            is_potential_medical: false,
            suggested_category: ExpenseCategory::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRule {
    pub id: Option<i64>,
    pub pattern: String,
    pub match_type: MatchType,
    pub category: ExpenseCategory,
    pub priority: i64,
}

fn rule_matches(haystack: &str, rule: &UserRule, compiled: Option<&Regex>) -> bool {
    match rule.match_type {
        MatchType::Contains => haystack.to_lowercase().contains(&rule.pattern.to_lowercase()),
        MatchType::StartsWith => haystack.to_lowercase().starts_with(&rule.pattern.to_lowercase()),
        MatchType::Regex => compiled.map_or(false, |re| re.is_match(haystack)),
    }
}

/// Ordered rule table: user rules by descending priority, then the built-in
/// keyword groups, then the provider category hint.
#[derive(Debug, Default)]
pub struct Classifier {
    rules: Vec<(UserRule, Option<Regex>)>,
}

impl Classifier {
    pub fn builtin() -> Self {
        Self::default()
    }

    pub fn with_rules(mut rules: Vec<UserRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        let rules = rules
            .into_iter()
            .map(|rule| {
                // A rule with an invalid pattern simply never matches.
                let compiled = match rule.match_type {
                    MatchType::Regex => Regex::new(&rule.pattern).ok(),
                    _ => None,
                };
                (rule, compiled)
            })
            .collect();
        Self { rules }
    }

    /// Built-in table plus the user's active rules.
    pub fn load(conn: &Connection, user_id: &str) -> Result<Self> {
        Ok(Self::with_rules(list_rules(conn, user_id)?))
    }

    pub fn classify(
        &self,
        description: &str,
        merchant_name: Option<&str>,
        category_hint: Option<&str>,
    ) -> Classification {
        let haystack = match merchant_name {
            Some(m) => format!("{description} {m}"),
            None => description.to_string(),
        };

        for (rule, compiled) in &self.rules {
            if rule_matches(&haystack, rule, compiled.as_ref()) {
                return Classification::medical(rule.category);
            }
        }

        let lowered = haystack.to_lowercase();
        for group in KEYWORD_GROUPS {
            if group.keywords.iter().any(|k| lowered.contains(k)) {
                log::trace!("'{description}' matched keyword group {}", group.name);
                return Classification::medical(group.category);
            }
        }

        if let Some(hint) = category_hint {
            let hint = hint.to_lowercase();
            for (needle, category) in CATEGORY_HINTS {
                if hint.contains(needle) {
                    return Classification::medical(*category);
                }
            }
        }

        Classification::other()
    }
}

pub fn add_rule(
    conn: &Connection,
    user_id: &str,
    pattern: &str,
    match_type: MatchType,
    category: ExpenseCategory,
    priority: i64,
) -> Result<i64> {
    if pattern.trim().is_empty() {
        return Err(CareError::Validation("rule pattern is empty".to_string()));
    }
    if match_type == MatchType::Regex {
        Regex::new(pattern)
            .map_err(|e| CareError::Validation(format!("invalid regex '{pattern}': {e}")))?;
    }
    conn.execute(
        "INSERT INTO classifier_rules (user_id, pattern, match_type, category, priority) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![user_id, pattern, match_type.key(), category.key(), priority],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_rules(conn: &Connection, user_id: &str) -> Result<Vec<UserRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, pattern, match_type, category, priority FROM classifier_rules \
         WHERE user_id = ?1 AND is_active = 1 ORDER BY priority DESC, id",
    )?;
    let raw: Vec<(i64, String, String, String, i64)> = stmt
        .query_map([user_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(id, pattern, match_type, category, priority)| {
            Ok(UserRule {
                id: Some(id),
                pattern,
                match_type: match_type.parse()?,
                category: category.parse()?,
                priority,
            })
        })
        .collect()
}

pub fn deactivate_rule(conn: &Connection, user_id: &str, rule_id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE classifier_rules SET is_active = 0 WHERE id = ?1 AND user_id = ?2",
        rusqlite::params![rule_id, user_id],
    )?;
    if changed == 0 {
        return Err(CareError::NotFound(format!("rule {rule_id}")));
    }
    Ok(())
}
