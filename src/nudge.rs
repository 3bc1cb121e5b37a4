//! Rule-based serendipity nudge suggestions.
//!
//! Produces one small, low-friction suggestion from a mood label plus
//! optional energy, context, time-of-day, and location hints. The selection
//! is a pure keyword-driven decision table, not a model call: the calling
//! agent can send the nudge as-is, rewrite it, or drop it, and record the
//! outcome via the `log_event` tool. The table leans conservative and picks
//! ultra-low-friction options whenever the mood reads as overwhelm.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::envelope::Envelope;
use crate::tools::{Tool, ToolContext};

/// One suggested micro-nudge.
#[derive(Debug, Clone, Serialize)]
pub struct Nudge {
    /// Short label, a few words.
    pub title: String,
    /// Full suggestion text, ready to send or adapt.
    pub body: String,
    pub estimated_duration_minutes: u32,
    /// `"ultra_low"`, `"low"`, or `"medium"`.
    pub friction_level: &'static str,
    /// `"restorative"`, `"gentle"`, `"playful"`, `"focused"`, or
    /// `"reflective"`.
    pub energy_match: &'static str,
    pub environment: &'static str,
    /// Default suggested follow-up, e.g. `"sent_nudge_imessage"`.
    pub action: &'static str,
    /// Why this kind of nudge fits the reported state.
    pub reason: String,
    pub tags: Vec<String>,
}

/// The mood signals a nudge is selected from.
#[derive(Debug, Default)]
pub struct NudgeInput<'a> {
    pub mood: &'a str,
    pub energy: &'a str,
    pub context: &'a str,
    pub time_of_day: &'a str,
    pub location_state: &'a str,
    pub recent_pattern: Option<&'a str>,
}

fn has_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Select a nudge for the given signals.
///
/// Branches are checked in priority order: overwhelm first (always gets the
/// shortest grounding option), then low energy, flat mood, curiosity, and
/// finally time-of-day defaults. Unrecognized input falls back to a
/// two-minute grounding pause.
pub fn build_nudge(input: &NudgeInput) -> Nudge {
    let mood = input.mood.to_lowercase();
    let energy = input.energy.to_lowercase();
    let context = input.context.to_lowercase();
    let time_of_day = input.time_of_day.to_lowercase();
    let location = input.location_state.to_lowercase();

    let mut tags = vec!["serendipity_nudge".to_string()];
    if !time_of_day.is_empty() {
        tags.push(time_of_day.clone());
    }
    if !location.is_empty() {
        tags.push(location.clone());
    }

    let is_anxious = has_any(&mood, &["anxious", "nervous", "worried", "tense"])
        || has_any(&energy, &["wired", "jittery"]);
    let is_overstimulated = has_any(&mood, &["overwhelmed", "overstimulated", "flooded"])
        || has_any(&energy, &["overloaded", "overstim"]);
    let is_low = has_any(&mood, &["tired", "exhausted", "drained", "low"])
        || has_any(&energy, &["low", "exhausted", "fried"]);
    let is_flat = has_any(&mood, &["meh", "flat", "neutral", "blank"]);
    let is_curious = has_any(&mood, &["curious", "interested", "playful"])
        || has_any(&context, &["idea", "explore", "exploring"]);

    let is_evening = matches!(
        time_of_day.as_str(),
        "evening" | "late_evening" | "night" | "late_night"
    );
    let is_morning = matches!(time_of_day.as_str(), "morning" | "early_morning");
    let at_home = location == "at_home" || has_any(&context, &["at home", "home all day"]);

    let mut nudge = if is_anxious || is_overstimulated {
        tags.extend(["grounding", "anxiety_support", "micro_reset"].map(String::from));
        Nudge {
            title: "60-second sensory reset".to_string(),
            body: "Let's do a 60-second reset:\n\
                   - Put one hand on your chest, one on your belly.\n\
                   - Breathe in through your nose for 4, out for 6.\n\
                   - On each exhale, tell yourself: \"Nothing to fix right now, just exhale.\"\n\n\
                   You can stop after one minute. No pressure to do more."
                .to_string(),
            estimated_duration_minutes: 2,
            friction_level: "ultra_low",
            energy_match: "restorative",
            environment: "indoors",
            action: "sent_nudge_imessage",
            reason: "Mood/energy suggest anxiety or overstimulation; a tiny grounding pause \
                     is kind and low-friction."
                .to_string(),
            tags,
        }
    } else if is_low && is_evening {
        tags.extend(["cozy", "evening", "micro_ritual"].map(String::from));
        Nudge {
            title: "Cozy 5-minute nest".to_string(),
            body: "Make a tiny 5-minute pocket of comfort:\n\
                   - Dim one light or switch to a warmer lamp.\n\
                   - Add one soft thing (blanket, pillow, hoodie).\n\
                   - Put on one gentle song you like.\n\n\
                   Nothing else required. Just let your body register \"we're safe and cozy\" \
                   for one track."
                .to_string(),
            estimated_duration_minutes: 5,
            friction_level: "low",
            energy_match: "restorative",
            environment: "indoors",
            action: "sent_nudge_imessage",
            reason: "Low energy in the evening pairs well with a tiny, no-pressure cozy ritual."
                .to_string(),
            tags,
        }
    } else if is_low {
        tags.extend(["body_care", "gentle", "energy_low"].map(String::from));
        Nudge {
            title: "One soft body kindness".to_string(),
            body: "Offer your body one small kindness:\n\
                   - Sip a glass of water or warm tea, or\n\
                   - Stretch your shoulders + neck for 30 seconds, or\n\
                   - Stand up, shake out your hands for 20 seconds.\n\n\
                   Pick exactly one and then you're done."
                .to_string(),
            estimated_duration_minutes: 3,
            friction_level: "ultra_low",
            energy_match: "restorative",
            environment: "indoors",
            action: "sent_nudge_imessage",
            reason: "Energy reads low; a single tiny kindness is achievable without pressure."
                .to_string(),
            tags,
        }
    } else if is_flat && at_home {
        tags.extend(["micro_adventure", "at_home", "playful"].map(String::from));
        Nudge {
            title: "2-minute home micro-adventure".to_string(),
            body: "Do a tiny home micro-adventure:\n\
                   - Walk to a window you don't usually look out of.\n\
                   - Notice one small detail outside that you've never really looked at.\n\
                   - Give it a silly or poetic name.\n\n\
                   Then come back. That's it."
                .to_string(),
            estimated_duration_minutes: 3,
            friction_level: "low",
            energy_match: "playful",
            environment: "indoors",
            action: "sent_nudge_imessage",
            reason: "Flat/neutral mood at home is a good moment for a tiny, low-effort \
                     perspective shift."
                .to_string(),
            tags,
        }
    } else if is_curious {
        tags.extend(["curiosity", "idea_capture", "micro_session"].map(String::from));
        Nudge {
            title: "Follow-the-thread for 5 minutes".to_string(),
            body: "You seem a bit curious. Try a 5-minute follow-the-thread:\n\
                   - Pick one thought, idea, or question that's been hovering.\n\
                   - Open a note and write 5 bullet points about it: no structure, just fragments.\n\
                   - Stop after 5 minutes, even if you're mid-thought.\n\n\
                   This is about capturing the spark, not finishing anything."
                .to_string(),
            estimated_duration_minutes: 5,
            friction_level: "low",
            energy_match: "focused",
            environment: "indoors",
            action: "sent_nudge_imessage",
            reason: "Curious mood benefits from a short, bounded exploration instead of a \
                     big task."
                .to_string(),
            tags,
        }
    } else if is_evening {
        tags.extend(["evening", "reflection", "closure"].map(String::from));
        Nudge {
            title: "Three-line evening snapshot".to_string(),
            body: "Capture today in three lines:\n\
                   1) One thing your body experienced today.\n\
                   2) One small moment you want to keep.\n\
                   3) One thing future-you doesn't need to carry from today.\n\n\
                   Write them anywhere; no need to be deep or polished."
                .to_string(),
            estimated_duration_minutes: 4,
            friction_level: "low",
            energy_match: "reflective",
            environment: "indoors",
            action: "sent_nudge_imessage",
            reason: "Evening is a good moment for a tiny reflection anchor without demanding \
                     a full journal session."
                .to_string(),
            tags,
        }
    } else if is_morning {
        tags.extend(["morning", "orientation", "check_in"].map(String::from));
        Nudge {
            title: "Gentle 3-step morning check-in".to_string(),
            body: "Quick 3-step check-in for this morning:\n\
                   - Notice one sensation in your body right now.\n\
                   - Name one thing that is completely optional today.\n\
                   - Name one thing that would feel like \"enough\" if you did only that.\n\n\
                   You don't have to act on any of it yet; just name them."
                .to_string(),
            estimated_duration_minutes: 4,
            friction_level: "low",
            energy_match: "gentle",
            environment: "indoors",
            action: "sent_nudge_imessage",
            reason: "Morning benefits from soft orientation instead of ambition.".to_string(),
            tags,
        }
    } else {
        Nudge {
            title: "Micro-breath for right now".to_string(),
            body: "Take one gentle minute to look away from screens, notice three things \
                   you can see, two things you can feel, and one thing you can hear. \
                   No fixing, just noticing."
                .to_string(),
            estimated_duration_minutes: 2,
            friction_level: "ultra_low",
            energy_match: "restorative",
            environment: "indoors",
            action: "sent_nudge_imessage",
            reason: "Default grounding micro-pause; safe when mood is unclear.".to_string(),
            tags,
        }
    };

    if let Some(pattern) = input.recent_pattern.filter(|p| !p.trim().is_empty()) {
        nudge.tags.push("pattern_aware".to_string());
        nudge
            .reason
            .push_str(&format!(" Recent pattern summary: {}.", pattern));
    }

    nudge
}

/// Suggest one tiny nudge from the reported mood signals.
pub struct GenerateNudgeTool;

#[async_trait]
impl Tool for GenerateNudgeTool {
    fn name(&self) -> &str {
        "generate_nudge"
    }

    fn description(&self) -> &str {
        "Suggest a tiny, low-friction nudge from a mood and optional context"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mood": { "type": "string", "description": "Short mood label, e.g. 'tired', 'anxious', 'curious'" },
                "energy": { "type": "string", "description": "Free-text energy/body state, e.g. 'low', 'wired'" },
                "context": { "type": "string", "description": "What is going on, e.g. 'at home all day'" },
                "time_of_day": { "type": "string", "description": "e.g. 'morning', 'evening', 'late_night'" },
                "location_state": { "type": "string", "description": "Coarse label like 'at_home' or 'out'" },
                "recent_pattern_summary": { "type": "string", "description": "Short note on recent mood patterns" }
            },
            "required": ["mood"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Envelope> {
        let mood = params["mood"].as_str().unwrap_or("").trim();
        if mood.is_empty() {
            return Ok(Envelope::failed(
                "mood is required.",
                json!({}),
                vec!["mood is required.".to_string()],
            ));
        }

        let input = NudgeInput {
            mood,
            energy: params["energy"].as_str().unwrap_or(""),
            context: params["context"].as_str().unwrap_or(""),
            time_of_day: params["time_of_day"].as_str().unwrap_or(""),
            location_state: params["location_state"].as_str().unwrap_or(""),
            recent_pattern: params["recent_pattern_summary"].as_str(),
        };
        let nudge = build_nudge(&input);

        Ok(Envelope::ok(
            format!("Nudge suggestion: {}.", nudge.title),
            serde_json::to_value(&nudge)?,
        )
        .with_next_actions([
            "Send, rewrite, or drop the nudge, then record the outcome with log_event.",
        ]))
    }
}
