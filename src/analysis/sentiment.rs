//! Lexicon-based sentiment scoring.
//!
//! Each token is looked up in a valence lexicon (roughly -4..4). A negation
//! within the three preceding tokens flips and damps the valence, and a
//! booster immediately before the word nudges it away from zero. The summed
//! valence is squashed into [-1, 1] with `s / sqrt(s^2 + 15)`.

use std::collections::{HashMap, HashSet};

const NEGATION_SCALAR: f64 = -0.74;
const BOOST_INCREMENT: f64 = 0.293;
const EXCLAMATION_INCREMENT: f64 = 0.292;
const NORMALIZATION_ALPHA: f64 = 15.0;

pub struct SentimentLexicon {
    valence: HashMap<&'static str, f64>,
    negations: HashSet<&'static str>,
    boosters: HashMap<&'static str, f64>,
}

impl Default for SentimentLexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentLexicon {
    pub fn new() -> Self {
        let valence: HashMap<&'static str, f64> = [
            // Relief and recovery
            ("safe", 1.9),
            ("safely", 1.8),
            ("safety", 1.8),
            ("help", 1.7),
            ("helped", 1.7),
            ("helping", 1.6),
            ("relief", 2.1),
            ("recover", 1.5),
            ("recovered", 1.6),
            ("recovery", 1.6),
            ("rescue", 1.5),
            ("rescued", 1.8),
            ("support", 1.7),
            ("supported", 1.6),
            ("restore", 1.4),
            ("restored", 1.6),
            ("reopen", 1.1),
            ("reopened", 1.2),
            ("improve", 1.9),
            ("improved", 2.1),
            ("improving", 1.8),
            ("hope", 1.9),
            ("hopeful", 2.0),
            ("good", 1.9),
            ("great", 3.1),
            ("success", 2.7),
            ("successful", 2.8),
            ("successfully", 2.6),
            ("thanks", 1.9),
            ("thank", 1.5),
            ("grateful", 2.0),
            ("welcome", 2.0),
            ("calm", 1.3),
            ("stable", 1.2),
            ("protect", 1.4),
            ("protected", 1.5),
            ("secure", 1.4),
            ("resolved", 1.5),
            ("survived", 1.5),
            ("survivors", 1.0),
            ("brave", 2.4),
            ("heroic", 2.6),
            ("praise", 2.6),
            ("praised", 2.2),
            ("easing", 1.0),
            ("eased", 1.1),
            ("donate", 1.4),
            ("donated", 1.4),
            ("donations", 1.3),
            ("volunteers", 1.1),
            ("rebuild", 1.2),
            ("rebuilt", 1.3),
            ("peace", 2.5),
            ("peaceful", 2.2),
            ("positive", 2.6),
            ("benefit", 2.0),
            ("fortunate", 1.9),
            ("lucky", 1.8),
            // Harm and disruption
            ("killed", -3.5),
            ("kill", -3.7),
            ("dead", -3.3),
            ("death", -2.9),
            ("deaths", -2.9),
            ("died", -2.6),
            ("fatal", -2.9),
            ("fatalities", -2.9),
            ("injured", -2.1),
            ("injuries", -2.0),
            ("injury", -1.9),
            ("wounded", -2.2),
            ("hurt", -2.4),
            ("destroyed", -2.9),
            ("destruction", -2.7),
            ("devastating", -3.0),
            ("devastated", -3.0),
            ("damage", -2.2),
            ("damaged", -2.1),
            ("disaster", -3.1),
            ("catastrophe", -3.4),
            ("catastrophic", -3.3),
            ("crisis", -3.1),
            ("emergency", -1.6),
            ("tragedy", -3.4),
            ("tragic", -3.2),
            ("violence", -3.1),
            ("violent", -2.9),
            ("attack", -2.1),
            ("attacked", -2.1),
            ("riot", -2.6),
            ("riots", -2.6),
            ("unrest", -1.7),
            ("protest", -1.0),
            ("protests", -1.0),
            ("clash", -1.8),
            ("clashes", -1.8),
            ("collapse", -2.2),
            ("collapsed", -2.2),
            ("missing", -1.2),
            ("trapped", -2.4),
            ("stranded", -1.7),
            ("evacuated", -1.0),
            ("evacuation", -1.0),
            ("threat", -2.4),
            ("threatened", -2.0),
            ("warning", -1.4),
            ("warned", -1.3),
            ("danger", -2.4),
            ("dangerous", -2.1),
            ("fear", -2.2),
            ("fears", -1.8),
            ("panic", -2.3),
            ("loss", -1.3),
            ("losses", -1.3),
            ("lost", -1.3),
            ("disrupted", -1.5),
            ("disruption", -1.5),
            ("disruptions", -1.5),
            ("shortage", -1.6),
            ("shortages", -1.6),
            ("outage", -1.5),
            ("outages", -1.5),
            ("delay", -1.3),
            ("delays", -1.3),
            ("cancelled", -1.3),
            ("severe", -1.6),
            ("worst", -3.1),
            ("bad", -2.5),
            ("worse", -2.1),
            ("problem", -1.7),
            ("problems", -1.7),
            ("fail", -2.5),
            ("failed", -2.3),
            ("failure", -2.3),
            ("suffering", -2.1),
            ("victims", -2.3),
            ("victim", -2.3),
            ("conflict", -1.3),
            ("war", -2.9),
            ("shooting", -2.4),
            ("explosion", -2.0),
            ("crash", -1.7),
            ("panicked", -2.0),
            ("anger", -2.7),
            ("angry", -2.3),
            ("chaos", -2.0),
            ("homeless", -1.8),
            ("starvation", -2.9),
            ("drought", -1.4),
            ("flooding", -1.3),
            ("flooded", -1.3),
            ("wildfire", -1.5),
            ("bushfire", -1.5),
        ]
        .into_iter()
        .collect();

        let negations: HashSet<&'static str> = [
            "not", "no", "never", "none", "nobody", "nothing", "neither", "nor", "nowhere",
            "cannot", "cant", "can't", "don't", "dont", "doesn't", "doesnt", "didn't", "didnt",
            "isn't", "isnt", "aren't", "arent", "wasn't", "wasnt", "weren't", "werent", "won't",
            "wont", "without", "hardly", "barely", "rarely",
        ]
        .into_iter()
        .collect();

        let boosters: HashMap<&'static str, f64> = [
            ("very", BOOST_INCREMENT),
            ("extremely", BOOST_INCREMENT),
            ("highly", BOOST_INCREMENT),
            ("hugely", BOOST_INCREMENT),
            ("massively", BOOST_INCREMENT),
            ("seriously", BOOST_INCREMENT),
            ("significantly", BOOST_INCREMENT),
            ("deeply", BOOST_INCREMENT),
            ("totally", BOOST_INCREMENT),
            ("completely", BOOST_INCREMENT),
            ("slightly", -BOOST_INCREMENT),
            ("somewhat", -BOOST_INCREMENT),
            ("marginally", -BOOST_INCREMENT),
            ("partly", -BOOST_INCREMENT),
        ]
        .into_iter()
        .collect();

        Self {
            valence,
            negations,
            boosters,
        }
    }

    pub fn valence(&self, word: &str) -> Option<f64> {
        self.valence.get(word).copied()
    }

    /// Compound score in [-1, 1]. Text without lexicon hits scores `0.0`.
    pub fn score(&self, text: &str) -> f64 {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|t| !t.is_empty())
            .collect();

        let mut sum = 0.0;
        let mut hits = 0usize;

        for (i, token) in tokens.iter().enumerate() {
            let Some(mut v) = self.valence(token) else {
                continue;
            };
            hits += 1;

            if i > 0 {
                if let Some(boost) = self.boosters.get(tokens[i - 1]) {
                    v += if v > 0.0 { *boost } else { -*boost };
                }
            }

            let window = i.saturating_sub(3)..i;
            if tokens[window].iter().any(|t| self.negations.contains(t)) {
                v *= NEGATION_SCALAR;
            }

            sum += v;
        }

        if hits == 0 {
            return 0.0;
        }

        let bangs = text.chars().filter(|c| *c == '!').count().min(4) as f64;
        if sum > 0.0 {
            sum += bangs * EXCLAMATION_INCREMENT;
        } else if sum < 0.0 {
            sum -= bangs * EXCLAMATION_INCREMENT;
        }

        let compound = sum / (sum * sum + NORMALIZATION_ALPHA).sqrt();
        compound.clamp(-1.0, 1.0)
    }
}
