//! Merge per-batch analysis results into one.
//!
//! - findings and recommendations are concatenated, repeats kept
//! - scalar profile fields take the first known value in batch order
//! - list profile fields are concatenated and deduplicated, first seen wins
//! - findings end up ordered by descending lesson length (stable)

use crate::types::{AnalysisResult, Finding, UserProfile, UNKNOWN};
use std::collections::HashSet;
use std::hash::Hash;

/// Merge results in batch order.
pub fn merge(results: &[AnalysisResult]) -> AnalysisResult {
    let mut mistakes: Vec<Finding> =
        results.iter().flat_map(|r| r.mistakes.iter().cloned()).collect();
    let mut successes: Vec<Finding> =
        results.iter().flat_map(|r| r.successes.iter().cloned()).collect();
    sort_by_lesson_length(&mut mistakes);
    sort_by_lesson_length(&mut successes);

    let recommendations = results
        .iter()
        .flat_map(|r| r.recommendations.iter().cloned())
        .collect();
    let profiles: Vec<&UserProfile> = results.iter().map(|r| &r.user_profile).collect();

    AnalysisResult {
        mistakes,
        successes,
        user_profile: merge_profiles(&profiles),
        recommendations,
    }
}

fn merge_profiles(profiles: &[&UserProfile]) -> UserProfile {
    let first_known = |get: fn(&UserProfile) -> &String| -> String {
        profiles
            .iter()
            .map(|p| get(p))
            .find(|v| !v.is_empty() && v.as_str() != UNKNOWN)
            .cloned()
            .unwrap_or_else(|| UNKNOWN.to_string())
    };
    let union = |get: fn(&UserProfile) -> &Vec<String>| -> Vec<String> {
        dedup(profiles.iter().flat_map(|p| get(p).iter().cloned()))
    };

    UserProfile {
        os: first_known(|p| &p.os),
        verbosity: first_known(|p| &p.verbosity),
        tech_level: first_known(|p| &p.tech_level),
        patience: first_known(|p| &p.patience),
        restrictions: union(|p| &p.restrictions),
        tools: union(|p| &p.tools),
        boundaries: union(|p| &p.boundaries),
        preferences: union(|p| &p.preferences),
    }
}

fn dedup<T: Eq + Hash + Clone>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

fn sort_by_lesson_length(findings: &mut [Finding]) {
    findings.sort_by(|a, b| b.lesson.chars().count().cmp(&a.lesson.chars().count()));
}
