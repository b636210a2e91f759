//! Layered contradiction detection.
//!
//! Given new content and a set of candidate memories, runs a cheap-to-
//! expensive pipeline: lexical/similarity pre-filter → negation check →
//! antonym check → factual triple check → semantic-rephrasing check → NLI
//! fallback. Layers are mutually exclusive per candidate (first match wins);
//! NLI runs only on otherwise-unclassified high-similarity candidates.
//!
//! The detector is advisory: it never returns an error. Provider failures
//! are logged and treated as "no additional signal". Given the same corpus
//! and configuration the output set and ordering are deterministic.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::config::DetectorConfig;
use crate::embedding::cosine_similarity;
use crate::memory::types::ContradictionKind;
use crate::nli::NliProvider;

/// A non-deleted, scope-visible memory considered for conflict.
#[derive(Debug, Clone)]
pub struct CandidateMemory {
    pub id: String,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

/// Scan breadth. Passive runs synchronously on every write against a bounded
/// recent window; proactive widens the window and reports stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    Passive,
    Proactive,
}

/// A detected conflict against one existing memory.
#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub id: String,
    #[serde(rename = "contradictionType")]
    pub kind: ContradictionKind,
    pub confidence: f64,
    pub overlap: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    /// Subtype-specific evidence, stored on the resulting edge.
    pub evidence: serde_json::Value,
}

/// Counters from a scan, returned in proactive mode.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub candidates_considered: usize,
    pub prefiltered_out: usize,
    pub nli_checked: usize,
    pub by_kind: HashMap<String, usize>,
}

/// Conflicts (sorted by confidence descending, id ascending) plus stats.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub conflicts: Vec<Conflict>,
    pub stats: ScanStats,
}

/// Run the full pipeline for `new_content` against `candidates`.
pub async fn detect(
    new_content: &str,
    new_embedding: Option<&[f32]>,
    candidates: &[CandidateMemory],
    nli: Option<&dyn NliProvider>,
    mode: DetectionMode,
    cfg: &DetectorConfig,
) -> ScanOutcome {
    let mut stats = ScanStats {
        candidates_considered: candidates.len(),
        ..Default::default()
    };
    let mut conflicts: Vec<Conflict> = Vec::new();

    let new_words = tokenize(new_content);
    let new_negated = has_negation(new_content, &new_words);
    let new_subject = leading_subject(&new_words);
    let new_facts = extract_facts(new_content);

    for candidate in candidates {
        let cand_words = tokenize(&candidate.content);
        let overlap = word_overlap(&new_words, &cand_words);
        let similarity = match (new_embedding, candidate.embedding.as_deref()) {
            (Some(a), Some(b)) => Some(cosine_similarity(a, b)),
            _ => None,
        };

        // Cheap pre-filter: below both minimums, nothing downstream can fire.
        if overlap < cfg.min_word_overlap && similarity.unwrap_or(0.0) < cfg.min_similarity {
            stats.prefiltered_out += 1;
            continue;
        }

        let conflict = classify_rules(
            &new_words,
            new_negated,
            &new_subject,
            &new_facts,
            candidate,
            &cand_words,
            overlap,
            similarity,
            cfg,
        );

        let conflict = match conflict {
            Some(c) => Some(c),
            // NLI tier: unclassified candidates with very high similarity only
            None => match (nli, similarity) {
                (Some(provider), Some(sim)) if sim >= cfg.nli_min_similarity => {
                    stats.nli_checked += 1;
                    nli_classify(provider, new_content, candidate, overlap, sim, cfg).await
                }
                _ => None,
            },
        };

        if let Some(c) = conflict {
            *stats.by_kind.entry(c.kind.as_str().to_string()).or_insert(0) += 1;
            conflicts.push(c);
        }
    }

    conflicts.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let limit = match mode {
        DetectionMode::Passive => cfg.passive_max_results,
        DetectionMode::Proactive => cfg.proactive_max_results,
    };
    conflicts.truncate(limit);

    ScanOutcome { conflicts, stats }
}

/// Pattern tiers (negation, antonym, factual, semantic). First match wins.
#[allow(clippy::too_many_arguments)]
fn classify_rules(
    new_words: &[String],
    new_negated: bool,
    new_subject: &[String],
    new_facts: &[Fact],
    candidate: &CandidateMemory,
    cand_words: &[String],
    overlap: f64,
    similarity: Option<f64>,
    cfg: &DetectorConfig,
) -> Option<Conflict> {
    let cand_negated = has_negation(&candidate.content, cand_words);

    // Tier 1: negation — exactly one side negated, same subject, tight overlap
    if new_negated != cand_negated {
        let cand_subject = leading_subject(cand_words);
        let subjects_agree = new_subject.is_empty()
            || cand_subject.is_empty()
            || new_subject.iter().any(|w| cand_subject.contains(w));

        // Without embeddings the similarity gate falls back to a stricter
        // overlap bound so lexical-only mode still catches direct negations.
        let similarity_ok = match similarity {
            Some(sim) => sim >= cfg.negation_similarity,
            None => overlap >= 0.6,
        };

        if subjects_agree && overlap >= cfg.negation_overlap && similarity_ok {
            let confidence = (overlap + similarity.unwrap_or(0.0) * cfg.negation_sim_weight)
                .min(cfg.negation_confidence_cap);
            return Some(Conflict {
                id: candidate.id.clone(),
                kind: ContradictionKind::Negation,
                confidence,
                overlap,
                similarity,
                evidence: serde_json::json!({
                    "negated_side": if new_negated { "new" } else { "existing" },
                }),
            });
        }
    }

    // Tier 2: antonym pair split across the texts, anchored to shared topic
    if let Some((a, b)) = find_antonym_split(new_words, cand_words) {
        let topics = shared_topic_words(new_words, cand_words);
        if topics.len() >= 2
            && near_topic_word(new_words, &a, &topics)
            && near_topic_word(cand_words, &b, &topics)
        {
            return Some(Conflict {
                id: candidate.id.clone(),
                kind: ContradictionKind::Antonym,
                confidence: cfg.antonym_confidence,
                overlap,
                similarity,
                evidence: serde_json::json!({ "pair": [a, b] }),
            });
        }
    }

    // Tier 3: factual triples with matching subjects and incompatible objects
    let cand_facts = extract_facts(&candidate.content);
    for nf in new_facts {
        for cf in &cand_facts {
            if predicate_group(&nf.predicate) == predicate_group(&cf.predicate)
                && subjects_match(&nf.subject, &cf.subject)
                && objects_conflict(&nf.object, &cf.object)
            {
                return Some(Conflict {
                    id: candidate.id.clone(),
                    kind: ContradictionKind::Factual,
                    confidence: cfg.factual_confidence,
                    overlap,
                    similarity,
                    evidence: serde_json::json!({
                        "subject": nf.subject.join(" "),
                        "new_object": nf.object.join(" "),
                        "existing_object": cf.object.join(" "),
                    }),
                });
            }
        }
    }

    // Tier 4: near-identical meaning, low overlap, both sides negated —
    // likely the same negated claim rephrased against a positive original
    if let Some(sim) = similarity {
        if sim >= cfg.semantic_similarity
            && overlap < cfg.semantic_max_overlap
            && new_negated
            && cand_negated
        {
            return Some(Conflict {
                id: candidate.id.clone(),
                kind: ContradictionKind::Semantic,
                confidence: cfg.semantic_confidence,
                overlap,
                similarity,
                evidence: serde_json::json!({ "similarity": sim }),
            });
        }
    }

    None
}

async fn nli_classify(
    provider: &dyn NliProvider,
    new_content: &str,
    candidate: &CandidateMemory,
    overlap: f64,
    similarity: f64,
    cfg: &DetectorConfig,
) -> Option<Conflict> {
    match provider.check(&candidate.content, new_content).await {
        Ok(verdict) if verdict.is_contradiction && verdict.confidence >= cfg.nli_min_confidence => {
            Some(Conflict {
                id: candidate.id.clone(),
                kind: ContradictionKind::Nli,
                confidence: verdict.confidence,
                overlap,
                similarity: Some(similarity),
                evidence: serde_json::json!({ "nli_confidence": verdict.confidence }),
            })
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(candidate = %candidate.id, error = %e, "NLI check failed, skipping tier");
            None
        }
    }
}

// ── Lexical helpers ───────────────────────────────────────────────────────────

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with", "from",
    "by", "as", "that", "this", "these", "those", "it", "its", "is", "are", "was", "were", "be",
    "been", "has", "have", "had", "will", "would", "can", "could", "should", "very", "about",
];

const EXPLICIT_NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "cannot", "nothing", "neither", "nor",
];

/// Markers that negate without an explicit "not": absence and cessation verbs.
const IMPLICIT_NEGATIONS: &[&str] = &["without", "lacks", "lacking", "missing", "stopped"];

/// Word pairs treated as direct opposites. One word on each side of a
/// candidate pair is a contradiction signal when anchored to a shared topic.
const ANTONYM_PAIRS: &[(&str, &str)] = &[
    ("enabled", "disabled"),
    ("on", "off"),
    ("true", "false"),
    ("deprecated", "supported"),
    ("always", "never"),
    ("allowed", "forbidden"),
    ("added", "removed"),
    ("open", "closed"),
    ("public", "private"),
    ("fast", "slow"),
    ("increase", "decrease"),
    ("start", "stop"),
    ("likes", "dislikes"),
    ("prefers", "avoids"),
    ("synchronous", "asynchronous"),
];

/// Token window within which an antonym must sit relative to a shared topic word.
const ANTONYM_TOPIC_WINDOW: usize = 8;

/// Minimum length for a word to count as "topic" or "significant".
const SIGNIFICANT_WORD_LEN: usize = 4;

/// Lowercased alphanumeric tokens, in order.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .map(|w| w.trim_matches('.'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

fn significant(word: &str) -> bool {
    word.len() >= SIGNIFICANT_WORD_LEN && !is_stopword(word)
}

/// Overlap ratio: shared unique words over the smaller unique-word set.
fn word_overlap(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(|s| s.as_str()).collect();
    let set_b: HashSet<&str> = b.iter().map(|s| s.as_str()).collect();
    let smaller = set_a.len().min(set_b.len());
    if smaller == 0 {
        return 0.0;
    }
    let shared = set_a.intersection(&set_b).count();
    shared as f64 / smaller as f64
}

/// Explicit or implicit negation anywhere in the text.
fn has_negation(raw: &str, words: &[String]) -> bool {
    if raw.to_lowercase().contains("n't") || raw.to_lowercase().contains("no longer") {
        return true;
    }
    words.iter().any(|w| {
        EXPLICIT_NEGATIONS.contains(&w.as_str()) || IMPLICIT_NEGATIONS.contains(&w.as_str())
    })
}

/// Naive subject: leading noun phrase — words before the first verb-ish
/// token, articles stripped, at most four words.
fn leading_subject(words: &[String]) -> Vec<String> {
    const VERBS: &[&str] = &[
        "is", "are", "was", "were", "has", "have", "had", "does", "do", "did", "uses", "used",
        "runs", "ran", "supports", "requires", "equals", "became", "becomes", "works", "worked",
    ];
    words
        .iter()
        .take_while(|w| !VERBS.contains(&w.as_str()))
        .filter(|w| !matches!(w.as_str(), "the" | "a" | "an"))
        .take(4)
        .cloned()
        .collect()
}

/// Find an antonym pair with one word in each text (in either orientation).
/// Returns (word-in-a, word-in-b).
fn find_antonym_split(a: &[String], b: &[String]) -> Option<(String, String)> {
    let set_a: HashSet<&str> = a.iter().map(|s| s.as_str()).collect();
    let set_b: HashSet<&str> = b.iter().map(|s| s.as_str()).collect();
    for (left, right) in ANTONYM_PAIRS {
        if set_a.contains(left) && set_b.contains(right) && !set_a.contains(right) {
            return Some((left.to_string(), right.to_string()));
        }
        if set_a.contains(right) && set_b.contains(left) && !set_a.contains(left) {
            return Some((right.to_string(), left.to_string()));
        }
    }
    None
}

/// Topic words (≥ 4 chars, non-stopword) present in both texts.
fn shared_topic_words(a: &[String], b: &[String]) -> HashSet<String> {
    let set_a: HashSet<&str> = a.iter().map(|s| s.as_str()).filter(|w| significant(w)).collect();
    b.iter()
        .filter(|w| significant(w) && set_a.contains(w.as_str()))
        .cloned()
        .collect()
}

/// `true` if `word` occurs within [`ANTONYM_TOPIC_WINDOW`] tokens of any
/// shared topic word. Filters coincidental antonym matches.
fn near_topic_word(words: &[String], word: &str, topics: &HashSet<String>) -> bool {
    let positions: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(_, w)| w.as_str() == word)
        .map(|(i, _)| i)
        .collect();
    words.iter().enumerate().any(|(i, w)| {
        topics.contains(w.as_str())
            && positions
                .iter()
                .any(|&p| p.abs_diff(i) <= ANTONYM_TOPIC_WINDOW)
    })
}

// ── Factual triple extraction ─────────────────────────────────────────────────

/// A naive subject–predicate–object triple.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fact {
    subject: Vec<String>,
    predicate: String,
    object: Vec<String>,
}

const FACT_PREDICATES: &[&str] = &[
    "is", "are", "was", "were", "use", "uses", "used", "run", "runs", "ran", "supports",
    "requires", "equals", "defaults", "returns", "lives", "works",
];

/// Inflections of the same predicate compare equal; facts with unrelated
/// predicates ("uses" vs "runs") never conflict.
fn predicate_group(predicate: &str) -> &'static str {
    match predicate {
        "is" | "are" | "was" | "were" => "be",
        "use" | "uses" | "used" => "use",
        "run" | "runs" | "ran" => "run",
        "works" | "worked" => "work",
        "supports" => "support",
        "requires" => "require",
        "equals" => "equal",
        "defaults" => "default",
        "returns" => "return",
        "lives" => "live",
        _ => "other",
    }
}

/// Extract at most one triple per sentence via predicate pattern matching.
pub(crate) fn extract_facts(text: &str) -> Vec<Fact> {
    let mut facts = Vec::new();
    for sentence in text.split(['.', '!', '?', ';']) {
        let words = tokenize(sentence);
        let Some(pred_idx) = words
            .iter()
            .position(|w| FACT_PREDICATES.contains(&w.as_str()))
        else {
            continue;
        };
        let subject: Vec<String> = words[..pred_idx]
            .iter()
            .filter(|w| !matches!(w.as_str(), "the" | "a" | "an"))
            .cloned()
            .collect();
        let object: Vec<String> = words[pred_idx + 1..]
            .iter()
            .filter(|w| !matches!(w.as_str(), "the" | "a" | "an"))
            .cloned()
            .collect();
        if subject.is_empty() || object.is_empty() {
            continue;
        }
        facts.push(Fact {
            subject,
            predicate: words[pred_idx].clone(),
            object,
        });
    }
    facts
}

/// Multi-word subjects match on ≥ 2 overlapping significant words; single-word
/// subjects require exact match.
fn subjects_match(a: &[String], b: &[String]) -> bool {
    if a.len() == 1 && b.len() == 1 {
        return a[0] == b[0];
    }
    if a.len() == 1 || b.len() == 1 {
        let single = if a.len() == 1 { &a[0] } else { &b[0] };
        let multi = if a.len() == 1 { b } else { a };
        return multi.contains(single);
    }
    let set_a: HashSet<&str> = a.iter().map(|s| s.as_str()).filter(|w| significant(w)).collect();
    let shared = b
        .iter()
        .filter(|w| significant(w) && set_a.contains(w.as_str()))
        .count();
    shared >= 2
}

/// Objects conflict when their numeric tokens differ, or — with no numerics —
/// when they share zero significant words.
fn objects_conflict(a: &[String], b: &[String]) -> bool {
    let nums_a = numeric_tokens(a);
    let nums_b = numeric_tokens(b);
    if !nums_a.is_empty() && !nums_b.is_empty() {
        return nums_a != nums_b;
    }

    let sig_a: HashSet<&str> = a.iter().map(|s| s.as_str()).filter(|w| significant(w)).collect();
    let sig_b: HashSet<&str> = b.iter().map(|s| s.as_str()).filter(|w| significant(w)).collect();
    if sig_a.is_empty() || sig_b.is_empty() {
        // Short objects ("on"/"off" style) conflict when fully disjoint
        let set_a: HashSet<&str> = a.iter().map(|s| s.as_str()).collect();
        return !b.iter().any(|w| set_a.contains(w.as_str()));
    }
    sig_a.intersection(&sig_b).count() == 0
}

fn numeric_tokens(words: &[String]) -> Vec<String> {
    words
        .iter()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .filter(|w| w.parse::<f64>().is_ok() || is_dotted_version(w))
        .cloned()
        .collect()
}

fn is_dotted_version(word: &str) -> bool {
    word.split('.').count() >= 2
        && word
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DetectorConfig {
        DetectorConfig::default()
    }

    fn candidate(id: &str, content: &str) -> CandidateMemory {
        CandidateMemory {
            id: id.into(),
            content: content.into(),
            embedding: None,
        }
    }

    /// Deterministic bag-of-words embedding: similar sentences → high cosine.
    fn bow_embedding(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 384];
        for word in tokenize(text) {
            let mut h: usize = 5381;
            for b in word.bytes() {
                h = h.wrapping_mul(33).wrapping_add(b as usize);
            }
            v[h % 384] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }

    fn embedded(id: &str, content: &str) -> CandidateMemory {
        CandidateMemory {
            id: id.into(),
            content: content.into(),
            embedding: Some(bow_embedding(content)),
        }
    }

    async fn detect_sync(
        content: &str,
        embedding: Option<&[f32]>,
        candidates: &[CandidateMemory],
    ) -> ScanOutcome {
        detect(
            content,
            embedding,
            candidates,
            None,
            DetectionMode::Passive,
            &cfg(),
        )
        .await
    }

    #[tokio::test]
    async fn negation_pair_is_detected() {
        let new = "The API is deprecated";
        let emb = bow_embedding(new);
        let candidates = vec![embedded("m1", "The API is not deprecated")];

        let outcome = detect_sync(new, Some(&emb), &candidates).await;
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ContradictionKind::Negation);
        assert_eq!(outcome.conflicts[0].id, "m1");
        assert!(outcome.conflicts[0].confidence <= cfg().negation_confidence_cap);
    }

    #[tokio::test]
    async fn negation_fires_without_embeddings_on_high_overlap() {
        let outcome = detect_sync(
            "The API is deprecated",
            None,
            &[candidate("m1", "The API is not deprecated")],
        )
        .await;
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ContradictionKind::Negation);
    }

    #[tokio::test]
    async fn factual_version_conflict_is_detected() {
        let new = "The server uses Python 3.9";
        let emb = bow_embedding(new);
        let candidates = vec![embedded("m1", "The server uses Python 3.11")];

        let outcome = detect_sync(new, Some(&emb), &candidates).await;
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ContradictionKind::Factual);
        assert_eq!(
            outcome.conflicts[0].evidence["subject"],
            serde_json::json!("server")
        );
    }

    #[tokio::test]
    async fn factual_disjoint_objects_conflict() {
        let outcome = detect_sync(
            "The database is postgres",
            None,
            &[candidate("m1", "The database is sqlite")],
        )
        .await;
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ContradictionKind::Factual);
    }

    #[tokio::test]
    async fn antonym_split_with_shared_topic_is_detected() {
        let outcome = detect_sync(
            "Telemetry collection stays enabled for beta cohort builds",
            None,
            &[candidate(
                "m1",
                "Telemetry collection stays disabled for beta cohort builds",
            )],
        )
        .await;
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ContradictionKind::Antonym);
    }

    #[tokio::test]
    async fn antonym_without_shared_topic_is_ignored() {
        let outcome = detect_sync(
            "Billing exports were enabled for all finance analytics dashboards yesterday",
            None,
            &[candidate("m1", "Alerts remain disabled pending network review cycles")],
        )
        .await;
        assert!(outcome.conflicts.is_empty());
    }

    #[tokio::test]
    async fn unrelated_content_passes_prefilter_out() {
        let new = "Quarterly revenue grew twelve percent";
        let emb = bow_embedding(new);
        let outcome = detect_sync(
            new,
            Some(&emb),
            &[embedded("m1", "The deploy pipeline uses blue green rollouts")],
        )
        .await;
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.stats.prefiltered_out, 1);
    }

    #[tokio::test]
    async fn layers_are_mutually_exclusive_first_wins() {
        // Negation and factual would both match; negation is the earlier tier.
        let new = "The cache is not persistent";
        let emb = bow_embedding(new);
        let outcome = detect_sync(
            new,
            Some(&emb),
            &[embedded("m1", "The cache is persistent")],
        )
        .await;
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ContradictionKind::Negation);
    }

    #[tokio::test]
    async fn detection_is_deterministic() {
        let new = "The server uses Python 3.9";
        let emb = bow_embedding(new);
        let candidates = vec![
            embedded("m1", "The server uses Python 3.11"),
            embedded("m2", "The server uses Python 3.12"),
            embedded("m3", "The server runs on Linux"),
        ];

        let first = detect_sync(new, Some(&emb), &candidates).await;
        let second = detect_sync(new, Some(&emb), &candidates).await;

        let ids_first: Vec<&str> = first.conflicts.iter().map(|c| c.id.as_str()).collect();
        let ids_second: Vec<&str> = second.conflicts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_first, ids_second);
        // Equal-confidence conflicts tie-break on id for stable ordering
        assert_eq!(ids_first, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn passive_mode_truncates_results() {
        let new = "The service uses port 8080";
        let emb = bow_embedding(new);
        let candidates: Vec<CandidateMemory> = (0..20)
            .map(|i| embedded(&format!("m{i:02}"), &format!("The service uses port {}", 9000 + i)))
            .collect();

        let outcome = detect_sync(new, Some(&emb), &candidates).await;
        assert_eq!(outcome.conflicts.len(), cfg().passive_max_results);
    }

    #[test]
    fn extract_facts_finds_triples() {
        let facts = extract_facts("The server uses Python 3.11. Deploys run nightly.");
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].subject, vec!["server"]);
        assert_eq!(facts[0].predicate, "uses");
        assert_eq!(facts[0].object, vec!["python", "3.11"]);
    }

    #[test]
    fn word_overlap_ratio() {
        let a = tokenize("the api is deprecated");
        let b = tokenize("the api is not deprecated");
        assert!(word_overlap(&a, &b) >= 0.9);

        let c = tokenize("completely unrelated words here");
        assert!(word_overlap(&a, &c) < 0.1);
    }

    #[test]
    fn version_tokens_are_numeric() {
        assert_eq!(numeric_tokens(&tokenize("python 3.11")), vec!["3.11"]);
        assert_eq!(numeric_tokens(&tokenize("port 8080")), vec!["8080"]);
        assert!(numeric_tokens(&tokenize("no numbers here")).is_empty());
    }

    #[test]
    fn subject_matching_rules() {
        let single_a = vec!["server".to_string()];
        let single_b = vec!["server".to_string()];
        let single_c = vec!["client".to_string()];
        assert!(subjects_match(&single_a, &single_b));
        assert!(!subjects_match(&single_a, &single_c));

        let multi_a = vec!["payment".to_string(), "gateway".to_string(), "service".to_string()];
        let multi_b = vec!["payment".to_string(), "gateway".to_string(), "cluster".to_string()];
        assert!(subjects_match(&multi_a, &multi_b));

        let multi_c = vec!["email".to_string(), "relay".to_string()];
        assert!(!subjects_match(&multi_a, &multi_c));
    }
}
