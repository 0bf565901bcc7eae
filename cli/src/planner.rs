//! Offline composition planner.
//!
//! Turns free prompt text into a direct-shape plan by keyword matching, so
//! the wizard can run end to end without a backend. The output is the same
//! raw JSON the `/plan` endpoint returns and goes through the same
//! normalization.

use crate::plan::direct_plan_value;
use serde_json::{json, Value};
use std::collections::HashSet;

/// Marker the mock prompt uses to carry the user's narrative.
pub const STORY_MARKER: &str = "Story:";
const INSTRUMENTAL_CUES: &[&str] = &["purely instrumental", "no vocals", "instrumental only"];
const MAX_LYRIC_LINES: usize = 2;

struct SectionTemplate {
    name: &'static str,
    duration_ms: u64,
    positive: &'static [&'static str],
    negative: &'static [&'static str],
    vocal: bool,
}

struct FormTemplate {
    keywords: &'static [&'static str],
    sections: &'static [SectionTemplate],
}

const FORMS: &[FormTemplate] = &[
    FormTemplate {
        keywords: &["ad/brand", "ad spot", "jingle", "commercial"],
        sections: &[
            SectionTemplate {
                name: "Hook",
                duration_ms: 6000,
                positive: &["instant hook", "catchy motif"],
                negative: &["slow build"],
                vocal: true,
            },
            SectionTemplate {
                name: "Body",
                duration_ms: 18000,
                positive: &["full groove", "room for voiceover"],
                negative: &["busy lead"],
                vocal: false,
            },
            SectionTemplate {
                name: "Button Ending",
                duration_ms: 6000,
                positive: &["punchy final hit"],
                negative: &["fade out"],
                vocal: true,
            },
        ],
    },
    FormTemplate {
        keywords: &["podcast", "voiceover", "background bed"],
        sections: &[
            SectionTemplate {
                name: "Intro",
                duration_ms: 8000,
                positive: &["soft entrance"],
                negative: &["loud drums"],
                vocal: false,
            },
            SectionTemplate {
                name: "Loop",
                duration_ms: 44000,
                positive: &["steady unobtrusive groove", "seamless loop point"],
                negative: &["dramatic changes", "lead melody"],
                vocal: false,
            },
            SectionTemplate {
                name: "Tail",
                duration_ms: 8000,
                positive: &["loops back to intro"],
                negative: &["hard ending"],
                vocal: false,
            },
        ],
    },
    FormTemplate {
        keywords: &["video game", "game music", "action track"],
        sections: &[
            SectionTemplate {
                name: "Intro",
                duration_ms: 10000,
                positive: &["stuttering synth intro", "quick drum fill"],
                negative: &["melody"],
                vocal: false,
            },
            SectionTemplate {
                name: "Main Loop",
                duration_ms: 60000,
                positive: &["full energy", "driving arpeggio", "aggressive rhythm"],
                negative: &["slow tempo"],
                vocal: false,
            },
            SectionTemplate {
                name: "Exit",
                duration_ms: 20000,
                positive: &["final explosive hit", "echoing reverb tail"],
                negative: &["melodic resolution"],
                vocal: false,
            },
        ],
    },
    FormTemplate {
        keywords: &["meditation", "sleep", "relaxation"],
        sections: &[
            SectionTemplate {
                name: "Settling",
                duration_ms: 30000,
                positive: &["slow swells", "breath-paced pulse"],
                negative: &["percussion"],
                vocal: false,
            },
            SectionTemplate {
                name: "Drift",
                duration_ms: 90000,
                positive: &["sustained pads", "gentle overtones"],
                negative: &["sudden changes", "percussion"],
                vocal: false,
            },
            SectionTemplate {
                name: "Fade",
                duration_ms: 60000,
                positive: &["gentle fade", "long reverb"],
                negative: &["hard stop"],
                vocal: false,
            },
        ],
    },
    FormTemplate {
        keywords: &["mini-song", "song", "lyrics"],
        sections: &[
            SectionTemplate {
                name: "Intro",
                duration_ms: 8000,
                positive: &["sparse arrangement"],
                negative: &["vocals"],
                vocal: false,
            },
            SectionTemplate {
                name: "Verse",
                duration_ms: 24000,
                positive: &["storytelling vocal", "laid-back groove"],
                negative: &["full band"],
                vocal: true,
            },
            SectionTemplate {
                name: "Chorus",
                duration_ms: 20000,
                positive: &["anthemic vocal", "full band"],
                negative: &["thin mix"],
                vocal: true,
            },
            SectionTemplate {
                name: "Bridge",
                duration_ms: 16000,
                positive: &["key change", "stripped back"],
                negative: &["repetition"],
                vocal: true,
            },
            SectionTemplate {
                name: "Final Chorus",
                duration_ms: 16000,
                positive: &["biggest energy", "layered harmonies"],
                negative: &["restraint"],
                vocal: true,
            },
            SectionTemplate {
                name: "Outro",
                duration_ms: 6000,
                positive: &["warm resolution"],
                negative: &["abrupt stop"],
                vocal: false,
            },
        ],
    },
];

const DEFAULT_FORM: &[SectionTemplate] = &[
    SectionTemplate {
        name: "Intro",
        duration_ms: 3000,
        positive: &["glitch effects", "quick drum fill"],
        negative: &["melody", "bass"],
        vocal: false,
    },
    SectionTemplate {
        name: "Main Section",
        duration_ms: 4000,
        positive: &["full energy", "punchy drum beat"],
        negative: &["slow tempo"],
        vocal: true,
    },
    SectionTemplate {
        name: "Outro",
        duration_ms: 3000,
        positive: &["final hit", "echoing reverb tail"],
        negative: &["fade out"],
        vocal: false,
    },
];

struct SoundPalette {
    keywords: &'static [&'static str],
    genres: &'static [&'static str],
    positive: &'static [&'static str],
    negative: &'static [&'static str],
}

const PALETTES: &[SoundPalette] = &[
    SoundPalette {
        keywords: &["electronic/edm", "pop", "edm", "electro"],
        genres: &["pop", "electronic"],
        positive: &["bright synth leads", "punchy drums", "sidechained pads", "124 bpm"],
        negative: &["lo-fi", "muddy low end"],
    },
    SoundPalette {
        keywords: &["trap", "hip-hop", "hip hop"],
        genres: &["trap", "hip-hop"],
        positive: &["808 bass", "hi-hat rolls", "dark pads", "140 bpm"],
        negative: &["bright", "acoustic"],
    },
    SoundPalette {
        keywords: &["lo-fi", "lofi", "chillhop"],
        genres: &["lo-fi", "chillhop"],
        positive: &["dusty electric piano", "vinyl crackle", "warm bass", "80 bpm"],
        negative: &["harsh", "distorted"],
    },
    SoundPalette {
        keywords: &["cinematic", "orchestral", "trailer"],
        genres: &["cinematic", "orchestral"],
        positive: &["orchestral strings", "brass swells", "taiko percussion"],
        negative: &["lo-fi", "electronic drums"],
    },
    SoundPalette {
        keywords: &["indie", "live band", "organic instruments"],
        genres: &["indie", "rock"],
        positive: &["live drums", "jangly electric guitar", "bass guitar", "95 bpm"],
        negative: &["synthetic", "autotune"],
    },
];

const RHYTHM_KEYWORDS: &[(&str, &str)] = &[
    ("waltz", "gentle 3/4 sway"),
    ("swing", "swinging groove"),
    ("house", "four-on-the-floor pulse"),
    ("techno", "driving techno rhythm"),
    ("breakbeat", "syncopated breakbeat"),
    ("bossa", "bossa nova sway"),
    ("reggae", "off-beat reggae groove"),
    ("live one-take", "loose live feel"),
    ("ambient", "floating pulse"),
];

const TEXTURE_KEYWORDS: &[(&str, &str)] = &[
    ("dream", "dreamy haze"),
    ("night", "late-night mood"),
    ("dark", "shadowy atmosphere"),
    ("bright", "glowing shimmer"),
    ("uplifting", "uplifting energy"),
    ("warm", "warm textures"),
    ("epic", "soaring atmosphere"),
    ("rain", "rain-soaked ambience"),
    ("ocean", "rolling ocean ambience"),
    ("birthday", "celebratory sparkle"),
    ("stem", "clean separated layers"),
];

const KEYS: [&str; 12] = [
    "C major", "G major", "D major", "A major", "E major", "B major", "F major", "E minor",
    "A minor", "D minor", "G minor", "C minor",
];

#[derive(Debug, Default)]
pub struct OfflinePlanner;

impl OfflinePlanner {
    pub fn new() -> Self {
        Self
    }

    /// Builds a direct-shape plan value for `prompt`. Same prompt, same plan.
    pub fn build_plan(&self, prompt: &str) -> Value {
        let prompt_lower = prompt.to_lowercase();
        let instrumental = INSTRUMENTAL_CUES.iter().any(|cue| prompt_lower.contains(cue));
        let story = story_text(prompt);
        let palette = match_palette(&prompt_lower);
        let seed = deterministic_seed(prompt);

        let mut positive: Vec<String> = Vec::new();
        let mut negative: Vec<String> = Vec::new();
        if let Some(palette) = palette {
            positive.extend(palette.positive.iter().map(|style| style.to_string()));
            negative.extend(palette.negative.iter().map(|style| style.to_string()));
        }
        positive.extend(extract_keywords(&prompt_lower, RHYTHM_KEYWORDS));
        positive.extend(extract_keywords(&prompt_lower, TEXTURE_KEYWORDS));
        positive.push(format!("key of {}", select_key(seed)));
        if instrumental {
            negative.push("vocals".to_string());
        }
        let positive = dedupe(positive);
        let negative = dedupe(negative);

        let lyrics = lyric_lines(story.as_deref().unwrap_or(prompt));
        let sections = match_form(&prompt_lower)
            .iter()
            .map(|template| {
                let lines: Vec<String> =
                    if template.vocal && !instrumental { lyrics.clone() } else { Vec::new() };
                json!({
                    "section_name": template.name,
                    "duration_ms": template.duration_ms,
                    "positive_local_styles": template.positive,
                    "negative_local_styles": template.negative,
                    "lines": lines,
                })
            })
            .collect();

        let motif = derive_motif(story.as_deref().unwrap_or(prompt));
        let genres: Vec<&str> = palette.map(|palette| palette.genres.to_vec()).unwrap_or_default();
        let metadata = json!({
            "title": title_case(&motif),
            "description": first_sentence(prompt),
            "genres": genres,
        });

        let positive: Vec<&str> = positive.iter().map(String::as_str).collect();
        let negative: Vec<&str> = negative.iter().map(String::as_str).collect();
        direct_plan_value(&positive, &negative, sections, Some(metadata))
    }
}

fn match_form(prompt_lower: &str) -> &'static [SectionTemplate] {
    FORMS
        .iter()
        .find(|form| form.keywords.iter().any(|keyword| prompt_lower.contains(keyword)))
        .map(|form| form.sections)
        .unwrap_or(DEFAULT_FORM)
}

/// Longest matching keyword wins.
fn match_palette(prompt_lower: &str) -> Option<&'static SoundPalette> {
    let mut best: Option<&SoundPalette> = None;
    let mut best_len = 0usize;
    for palette in PALETTES {
        for keyword in palette.keywords {
            if prompt_lower.contains(keyword) && keyword.len() > best_len {
                best = Some(palette);
                best_len = keyword.len();
            }
        }
    }
    best
}

fn story_text(prompt: &str) -> Option<String> {
    let (_, story) = prompt.split_once(STORY_MARKER)?;
    let story = story.trim();
    (!story.is_empty()).then(|| story.to_string())
}

fn lyric_lines(source: &str) -> Vec<String> {
    let lines: Vec<String> = source
        .split(|c: char| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(MAX_LYRIC_LINES)
        .map(|line| line.to_string())
        .collect();
    if lines.is_empty() {
        vec!["Oh-oh".to_string()]
    } else {
        lines
    }
}

fn select_key(seed: u64) -> &'static str {
    KEYS[(seed as usize) % KEYS.len()]
}

fn deterministic_seed(prompt: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in prompt.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn extract_keywords(prompt_lower: &str, mapping: &[(&str, &str)]) -> Vec<String> {
    let mut results = Vec::new();
    for (keyword, label) in mapping {
        if prompt_lower.contains(keyword) && !results.iter().any(|existing| existing == label) {
            results.push((*label).to_string());
        }
    }
    results
}

fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

fn derive_motif(text: &str) -> String {
    let words: Vec<&str> = text
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| ",.;:!?\"'".contains(c)))
        .filter(|token| !token.is_empty() && token.chars().all(char::is_alphabetic))
        .take(3)
        .collect();
    if words.is_empty() {
        "untitled sketch".to_string()
    } else {
        words.join(" ")
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_sentence(text: &str) -> String {
    text.split_terminator(['.', '\n']).map(str::trim).find(|s| !s.is_empty()).unwrap_or("").to_string()
}
