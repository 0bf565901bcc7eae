use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProjectBlueprint {
    AdBrandFastHook,
    PodcastVoiceoverLoop,
    VideoGameActionLoop,
    MeditationSleep,
    StandaloneSongMini,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SoundProfile {
    BrightPopElectro,
    DarkTrapNight,
    LofiCozy,
    EpicCinematic,
    IndieLiveBand,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryAndControl {
    ExploratoryIterate,
    BalancedStudio,
    BlueprintPlanFirst,
    LiveOneTake,
    IsolationStems,
}

/// Display metadata shared by every selectable option.
pub trait SelectionOption: Copy + Sized + 'static {
    const ALL: &'static [Self];
    const KIND: &'static str;

    fn id(&self) -> &'static str;
    fn label(&self) -> &'static str;
    fn summary(&self) -> &'static str;
    /// Longer text shown for the focused option; the mock backend reuses it
    /// as prompt wording.
    fn details(&self) -> &'static str;

    fn recommended(&self) -> bool {
        false
    }

    fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|option| option.id() == id)
    }
}

impl SelectionOption for ProjectBlueprint {
    // Instrumental presets first, matching the picker order.
    const ALL: &'static [Self] = &[
        Self::PodcastVoiceoverLoop,
        Self::VideoGameActionLoop,
        Self::MeditationSleep,
        Self::AdBrandFastHook,
        Self::StandaloneSongMini,
    ];
    const KIND: &'static str = "project blueprint";

    fn id(&self) -> &'static str {
        match self {
            Self::AdBrandFastHook => "ad_brand_fast_hook",
            Self::PodcastVoiceoverLoop => "podcast_voiceover_loop",
            Self::VideoGameActionLoop => "video_game_action_loop",
            Self::MeditationSleep => "meditation_sleep",
            Self::StandaloneSongMini => "standalone_song_mini",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::AdBrandFastHook => "Ad/Brand Spot",
            Self::PodcastVoiceoverLoop => "Podcast Bed",
            Self::VideoGameActionLoop => "Game Music",
            Self::MeditationSleep => "Meditation",
            Self::StandaloneSongMini => "Mini Song",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Self::AdBrandFastHook => "30 seconds, jingle or voiceover, button ending",
            Self::PodcastVoiceoverLoop => "60 seconds, seamless loop, instrumental",
            Self::VideoGameActionLoop => "90 seconds with intro, loop, and exit",
            Self::MeditationSleep => "Extended length, gentle fade, peaceful",
            Self::StandaloneSongMini => "90 seconds with vocals, lyrics, full structure",
        }
    }

    fn details(&self) -> &'static str {
        match self {
            Self::AdBrandFastHook => {
                "a 30-second ad/brand spot with a fast, attention-grabbing hook"
            }
            Self::PodcastVoiceoverLoop => "a 60-second loopable podcast background bed",
            Self::VideoGameActionLoop => "a 90-second loopable video game action track",
            Self::MeditationSleep => "ambient meditation and sleep music",
            Self::StandaloneSongMini => "a 90-second mini-song with full structure",
        }
    }
}

impl ProjectBlueprint {
    /// Presets that never carry vocals.
    pub fn is_instrumental_preset(&self) -> bool {
        matches!(
            self,
            Self::PodcastVoiceoverLoop | Self::VideoGameActionLoop | Self::MeditationSleep
        )
    }
}

impl SelectionOption for SoundProfile {
    const ALL: &'static [Self] = &[
        Self::BrightPopElectro,
        Self::DarkTrapNight,
        Self::LofiCozy,
        Self::EpicCinematic,
        Self::IndieLiveBand,
    ];
    const KIND: &'static str = "sound profile";

    fn id(&self) -> &'static str {
        match self {
            Self::BrightPopElectro => "bright_pop_electro",
            Self::DarkTrapNight => "dark_trap_night",
            Self::LofiCozy => "lofi_cozy",
            Self::EpicCinematic => "epic_cinematic",
            Self::IndieLiveBand => "indie_live_band",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::BrightPopElectro => "Pop/Electro",
            Self::DarkTrapNight => "Dark Trap",
            Self::LofiCozy => "Lo-Fi",
            Self::EpicCinematic => "Cinematic",
            Self::IndieLiveBand => "Indie Band",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Self::BrightPopElectro => "Happy, energetic, 110-125 BPM",
            Self::DarkTrapNight => "Intense, moody, 145-170 BPM",
            Self::LofiCozy => "Relaxed, cozy, 85-105 BPM",
            Self::EpicCinematic => "Grand, heroic, 110-125 BPM",
            Self::IndieLiveBand => "Authentic, warm, 85-105 BPM",
        }
    }

    fn details(&self) -> &'static str {
        match self {
            Self::BrightPopElectro => "uplifting electronic/EDM with bright pop sensibilities",
            Self::DarkTrapNight => "dark trap/hip-hop with nighttime vibes",
            Self::LofiCozy => "cozy lo-fi beats with warm textures",
            Self::EpicCinematic => "epic cinematic orchestral arrangements",
            Self::IndieLiveBand => "indie live band sound with organic instruments",
        }
    }

    fn recommended(&self) -> bool {
        matches!(self, Self::LofiCozy)
    }
}

impl SelectionOption for DeliveryAndControl {
    const ALL: &'static [Self] = &[
        Self::ExploratoryIterate,
        Self::BalancedStudio,
        Self::BlueprintPlanFirst,
        Self::LiveOneTake,
        Self::IsolationStems,
    ];
    const KIND: &'static str = "delivery and control";

    fn id(&self) -> &'static str {
        match self {
            Self::ExploratoryIterate => "exploratory_iterate",
            Self::BalancedStudio => "balanced_studio",
            Self::BlueprintPlanFirst => "blueprint_plan_first",
            Self::LiveOneTake => "live_one_take",
            Self::IsolationStems => "isolation_stems",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::ExploratoryIterate => "Exploratory",
            Self::BalancedStudio => "Balanced",
            Self::BlueprintPlanFirst => "Blueprint",
            Self::LiveOneTake => "Live Take",
            Self::IsolationStems => "Stems",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Self::ExploratoryIterate => "Maximum creativity, unique results",
            Self::BalancedStudio => "Recommended: professional, polished",
            Self::BlueprintPlanFirst => "Maximum structure, precise timing",
            Self::LiveOneTake => "Live performance feel, human touch",
            Self::IsolationStems => "Clean separation, edit-friendly",
        }
    }

    fn details(&self) -> &'static str {
        match self {
            Self::ExploratoryIterate => "an exploratory approach with room for iteration",
            Self::BalancedStudio => "a balanced studio production approach",
            Self::BlueprintPlanFirst => "a blueprint-first planning methodology",
            Self::LiveOneTake => "a live one-take recording style",
            Self::IsolationStems => "isolated stem outputs for maximum flexibility",
        }
    }

    fn recommended(&self) -> bool {
        matches!(self, Self::BalancedStudio)
    }
}

macro_rules! option_traits {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.id())
                }
            }

            impl FromStr for $ty {
                type Err = String;

                fn from_str(value: &str) -> Result<Self, Self::Err> {
                    <$ty as SelectionOption>::from_id(value.trim()).ok_or_else(|| {
                        let known = <$ty as SelectionOption>::ALL
                            .iter()
                            .map(|option| option.id())
                            .collect::<Vec<_>>()
                            .join(", ");
                        format!(
                            "unknown {} '{value}' (expected one of: {known})",
                            <$ty as SelectionOption>::KIND
                        )
                    })
                }
            }
        )+
    };
}

option_traits!(ProjectBlueprint, SoundProfile, DeliveryAndControl);

/// Step 1 choices. Unset options are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selections {
    pub project_blueprint: Option<ProjectBlueprint>,
    pub sound_profile: Option<SoundProfile>,
    pub delivery_and_control: Option<DeliveryAndControl>,
    #[serde(default)]
    pub instrumental_only: bool,
}

impl Selections {
    pub fn is_complete(&self) -> bool {
        self.project_blueprint.is_some()
            && self.sound_profile.is_some()
            && self.delivery_and_control.is_some()
    }

    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.project_blueprint.is_none() {
            missing.push(ProjectBlueprint::KIND);
        }
        if self.sound_profile.is_none() {
            missing.push(SoundProfile::KIND);
        }
        if self.delivery_and_control.is_none() {
            missing.push(DeliveryAndControl::KIND);
        }
        missing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendedCombo {
    pub use_case: &'static str,
    pub description: &'static str,
    pub blueprint: ProjectBlueprint,
    pub sound: SoundProfile,
    pub delivery: DeliveryAndControl,
}

pub const RECOMMENDED_COMBINATIONS: &[RecommendedCombo] = &[
    RecommendedCombo {
        use_case: "Social Media Ad",
        description: "Catchy, energetic clip for social media advertising",
        blueprint: ProjectBlueprint::AdBrandFastHook,
        sound: SoundProfile::BrightPopElectro,
        delivery: DeliveryAndControl::BalancedStudio,
    },
    RecommendedCombo {
        use_case: "Podcast Background",
        description: "Chill, unobtrusive background music for spoken content",
        blueprint: ProjectBlueprint::PodcastVoiceoverLoop,
        sound: SoundProfile::LofiCozy,
        delivery: DeliveryAndControl::ExploratoryIterate,
    },
    RecommendedCombo {
        use_case: "Gaming Video",
        description: "High-energy music for action and gaming content",
        blueprint: ProjectBlueprint::VideoGameActionLoop,
        sound: SoundProfile::DarkTrapNight,
        delivery: DeliveryAndControl::BlueprintPlanFirst,
    },
    RecommendedCombo {
        use_case: "Meditation Track",
        description: "Peaceful ambient music for relaxation and sleep",
        blueprint: ProjectBlueprint::MeditationSleep,
        sound: SoundProfile::LofiCozy,
        delivery: DeliveryAndControl::ExploratoryIterate,
    },
    RecommendedCombo {
        use_case: "Personal Song",
        description: "A complete song with vocals for someone special",
        blueprint: ProjectBlueprint::StandaloneSongMini,
        sound: SoundProfile::IndieLiveBand,
        delivery: DeliveryAndControl::BalancedStudio,
    },
    RecommendedCombo {
        use_case: "Epic Trailer",
        description: "Cinematic music for dramatic content and trailers",
        blueprint: ProjectBlueprint::VideoGameActionLoop,
        sound: SoundProfile::EpicCinematic,
        delivery: DeliveryAndControl::BlueprintPlanFirst,
    },
    RecommendedCombo {
        use_case: "Study Music",
        description: "Relaxing background music for focus and studying",
        blueprint: ProjectBlueprint::PodcastVoiceoverLoop,
        sound: SoundProfile::LofiCozy,
        delivery: DeliveryAndControl::ExploratoryIterate,
    },
    RecommendedCombo {
        use_case: "Birthday Song",
        description: "Upbeat celebratory song with personalized lyrics",
        blueprint: ProjectBlueprint::StandaloneSongMini,
        sound: SoundProfile::BrightPopElectro,
        delivery: DeliveryAndControl::BalancedStudio,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_ids_and_rejects_unknown() {
        assert_eq!(
            "ad_brand_fast_hook".parse::<ProjectBlueprint>(),
            Ok(ProjectBlueprint::AdBrandFastHook)
        );
        assert_eq!(" lofi_cozy ".parse::<SoundProfile>(), Ok(SoundProfile::LofiCozy));
        let err = "polka".parse::<DeliveryAndControl>().unwrap_err();
        assert!(err.contains("delivery and control"));
        assert!(err.contains("balanced_studio"));
    }

    #[test]
    fn serde_ids_match_option_ids() {
        for blueprint in ProjectBlueprint::ALL {
            let encoded = serde_json::to_value(blueprint).unwrap();
            assert_eq!(encoded, serde_json::Value::String(blueprint.id().to_string()));
        }
        for profile in SoundProfile::ALL {
            assert_eq!(serde_json::to_value(profile).unwrap(), profile.id());
        }
        for delivery in DeliveryAndControl::ALL {
            assert_eq!(serde_json::to_value(delivery).unwrap(), delivery.id());
        }
    }

    #[test]
    fn completeness_ignores_instrumental_flag() {
        let mut selections = Selections::default();
        assert!(!selections.is_complete());
        assert_eq!(selections.missing().len(), 3);

        selections.project_blueprint = Some(ProjectBlueprint::MeditationSleep);
        selections.sound_profile = Some(SoundProfile::EpicCinematic);
        assert!(!selections.is_complete());
        assert_eq!(selections.missing(), vec![DeliveryAndControl::KIND]);

        selections.delivery_and_control = Some(DeliveryAndControl::LiveOneTake);
        assert!(selections.is_complete());
        selections.instrumental_only = true;
        assert!(selections.is_complete());
    }

    #[test]
    fn instrumental_presets_lead_the_picker() {
        let leading = &ProjectBlueprint::ALL[..3];
        assert!(leading.iter().all(ProjectBlueprint::is_instrumental_preset));
        assert!(!ProjectBlueprint::StandaloneSongMini.is_instrumental_preset());
    }
}
