// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lexical scoring for the in-memory driver.
//!
//! A BM25-family scorer over the candidate set: saturating term frequency
//! weighted by inverse document frequency. Monotonic in term relevance,
//! which is all the driver contract requires.

use std::collections::HashMap;

const TF_SATURATION: f32 = 1.2;

/// Lowercase alphanumeric token runs.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Per-query scorer, built over the candidate document set.
pub struct LexicalScorer {
    df: HashMap<String, usize>,
    n_docs: usize,
}

impl LexicalScorer {
    pub fn new(docs: &[Vec<String>]) -> Self {
        let mut df: HashMap<String, usize> = HashMap::new();
        for doc in docs {
            let mut seen: Vec<&String> = Vec::new();
            for token in doc {
                if !seen.contains(&token) {
                    seen.push(token);
                    *df.entry(token.clone()).or_default() += 1;
                }
            }
        }
        Self {
            df,
            n_docs: docs.len(),
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let df = self.df.get(term).copied().unwrap_or(0) as f32;
        let n = self.n_docs as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score a document against the query. 0.0 when no query term occurs.
    pub fn score(&self, query: &[String], doc: &[String]) -> f32 {
        let mut score = 0.0;
        for term in query {
            let tf = doc.iter().filter(|t| *t == term).count() as f32;
            if tf > 0.0 {
                score += self.idf(term) * tf / (tf + TF_SATURATION);
            }
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<Vec<String>> {
        texts.iter().map(|t| tokenize(t)).collect()
    }

    #[test]
    fn tokenize_splits_on_non_alphanumeric() {
        assert_eq!(tokenize("Alice works at Acme!"), vec!["alice", "works", "at", "acme"]);
        assert_eq!(tokenize("  "), Vec::<String>::new());
        assert_eq!(tokenize("v1.2-beta"), vec!["v1", "2", "beta"]);
    }

    #[test]
    fn matching_docs_outscore_non_matching() {
        let corpus = docs(&[
            "Alice works at Acme",
            "Bob lives in Berlin",
            "the weather is fine",
        ]);
        let scorer = LexicalScorer::new(&corpus);
        let query = tokenize("alice acme");

        let hit = scorer.score(&query, &corpus[0]);
        let miss = scorer.score(&query, &corpus[2]);
        assert!(hit > 0.0);
        assert_eq!(miss, 0.0);
    }

    #[test]
    fn rare_terms_weigh_more() {
        let corpus = docs(&[
            "acme launched orion yesterday",
            "acme shipped a release",
            "acme hired engineers",
        ]);
        let scorer = LexicalScorer::new(&corpus);

        // "orion" is rarer than "acme" so the doc containing it should win
        // on a mixed query.
        let query = tokenize("acme orion");
        let with_rare = scorer.score(&query, &corpus[0]);
        let without = scorer.score(&query, &corpus[1]);
        assert!(with_rare > without);
    }

    #[test]
    fn more_occurrences_score_higher_but_saturate() {
        let corpus = docs(&["acme", "acme acme acme", "other"]);
        let scorer = LexicalScorer::new(&corpus);
        let query = tokenize("acme");

        let single = scorer.score(&query, &corpus[0]);
        let triple = scorer.score(&query, &corpus[1]);
        assert!(triple > single);
        assert!(triple < single * 3.0, "tf must saturate");
    }
}
