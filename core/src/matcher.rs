use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub cuisine_type: Option<String>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: Option<i64>,
    pub url: Option<String>,
    /// Required ingredient names.
    pub ingredients: Vec<String>,
}

impl Recipe {
    pub fn total_time(&self) -> i64 {
        self.prep_time.unwrap_or(0) + self.cook_time.unwrap_or(0)
    }
}

/// One scored recipe. Recomputed per request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub recipe_id: i64,
    /// 0–100.
    pub match_percentage: f64,
    pub matched: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Candidates scoring below this percentage are dropped.
    pub min_match_threshold: f64,
    pub max_results: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            min_match_threshold: 30.0,
            max_results: 5,
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Score every candidate by the share of its required ingredients the user
/// has. Sorted by percentage descending, then recipe id ascending.
pub fn match_ingredients(
    user_ingredients: &BTreeSet<String>,
    candidates: &[Recipe],
    options: &MatchOptions,
) -> Vec<MatchCandidate> {
    let have: BTreeSet<String> = user_ingredients
        .iter()
        .map(|s| normalize(s))
        .filter(|s| !s.is_empty())
        .collect();

    let mut scored: Vec<MatchCandidate> = candidates
        .iter()
        .map(|recipe| {
            let required: BTreeSet<String> =
                recipe.ingredients.iter().map(|s| normalize(s)).collect();
            let total = required.len();
            let matched = have.iter().filter(|i| required.contains(*i)).count();
            let match_percentage = if total == 0 {
                0.0
            } else {
                (matched as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
            };
            MatchCandidate {
                recipe_id: recipe.id,
                match_percentage,
                matched,
                total,
            }
        })
        .filter(|c| c.match_percentage >= options.min_match_threshold)
        .collect();

    sort_candidates(&mut scored);
    scored.truncate(options.max_results);
    scored
}

/// Case-insensitive substring match on recipe names. Every hit scores 100,
/// so ordering falls back to recipe id.
pub fn match_name(term: &str, candidates: &[Recipe], max_results: usize) -> Vec<MatchCandidate> {
    let needle = normalize(term);
    if needle.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<MatchCandidate> = candidates
        .iter()
        .filter(|r| r.name.to_lowercase().contains(&needle))
        .map(|r| MatchCandidate {
            recipe_id: r.id,
            match_percentage: 100.0,
            matched: 0,
            total: r.ingredients.len(),
        })
        .collect();

    sort_candidates(&mut hits);
    hits.truncate(max_results);
    hits
}

fn sort_candidates(candidates: &mut [MatchCandidate]) {
    candidates.sort_by(|a, b| {
        b.match_percentage
            .total_cmp(&a.match_percentage)
            .then(a.recipe_id.cmp(&b.recipe_id))
    });
}

// ---------------------------------------------------------------------------
// Input parsing and summaries
// ---------------------------------------------------------------------------

/// Heuristic ingredient extraction for when no model reply is usable:
/// split on commas, newlines and " and ", drop leading articles.
pub fn parse_user_ingredients(input: &str) -> BTreeSet<String> {
    const LEADING: &[&str] = &["a ", "an ", "the ", "some ", "any "];

    let lower = input.to_lowercase();
    lower
        .split([',', '\n'])
        .flat_map(|part| part.split(" and "))
        .filter_map(|part| {
            let mut item = part.trim();
            for word in LEADING {
                if let Some(rest) = item.strip_prefix(word) {
                    item = rest.trim();
                }
            }
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect()
}

/// Text summary of the top matches, used as context for the recommendation
/// prompt and as the fallback answer.
pub fn summarize(matches: &[MatchCandidate], recipes: &[Recipe], limit: usize) -> String {
    if matches.is_empty() {
        return "No recipes found.".to_string();
    }

    let by_id: HashMap<i64, &Recipe> = recipes.iter().map(|r| (r.id, r)).collect();
    let shown = matches.len().min(limit);
    let mut parts = vec![format!(
        "Found {} recipe(s). Top {} matches:\n",
        matches.len(),
        shown
    )];

    for (i, candidate) in matches.iter().take(limit).enumerate() {
        let Some(recipe) = by_id.get(&candidate.recipe_id) else {
            continue;
        };
        let match_info = if candidate.matched > 0 || candidate.match_percentage < 100.0 {
            format!(
                " (Match: {:.1}%, {}/{} ingredients)",
                candidate.match_percentage, candidate.matched, candidate.total
            )
        } else {
            String::new()
        };
        parts.push(format!("{}. {}{}", i + 1, recipe.name, match_info));
        parts.push(format!(
            "   - {}",
            recipe.description.as_deref().unwrap_or("No description")
        ));
        parts.push(format!(
            "   - Difficulty: {}, Time: {} min",
            recipe.difficulty.as_deref().unwrap_or("N/A"),
            recipe.total_time()
        ));
        if !recipe.ingredients.is_empty() {
            parts.push(format!("   - Ingredients: {}", recipe.ingredients.join(", ")));
        }
        parts.push(String::new());
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_articles_and_splits() {
        let parsed = parse_user_ingredients("Some chicken, the garlic and an onion\nrice");
        let expected: BTreeSet<String> = ["chicken", "garlic", "onion", "rice"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(parsed, expected);
        assert!(parse_user_ingredients(" , \n").is_empty());
    }
}
