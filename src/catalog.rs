//! Ad Catalog
//!
//! Static catalog of advertisements generated once at start-up from a fixed
//! template set, cycled to reach the configured size. Ids are the 1-based
//! position in string form, so lookup is a parse plus an index.

use serde::{Deserialize, Serialize};

/// Reward earned per second of ad duration.
pub const REWARD_RATE_PER_SECOND: f64 = 2.5;

/// Number of ads generated when no size is configured.
pub const DEFAULT_CATALOG_SIZE: usize = 100;

/// A single advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advertisement {
    /// Stringified 1-based index
    pub id: String,
    pub title: String,
    pub description: String,
    /// Reward in the primary currency (`duration * rate`)
    pub reward: f64,
    /// Playback duration in seconds
    pub duration: u32,
    pub video_url: String,
    pub thumbnail_url: String,
    pub thumbnail_hint: String,
}

struct AdTemplate {
    title: &'static str,
    description: &'static str,
    duration: u32,
    video_url: &'static str,
    thumbnail_hint: &'static str,
}

const VIDEO_BUCKET: &str = "https://storage.googleapis.com/gtv-videos-bucket/sample";

const BASE_ADS: [AdTemplate; 12] = [
    AdTemplate {
        title: "QuantumLeap Investing",
        description: "Invest in your future with our AI-powered trading platform. Maximize returns, minimize risk.",
        duration: 40,
        video_url: "ForBiggerFun.mp4",
        thumbnail_hint: "finance app",
    },
    AdTemplate {
        title: "The Future is Now: Drive the Nova-X",
        description: "Sleek design, unparalleled performance. The all-new Nova-X electric vehicle.",
        duration: 45,
        video_url: "ForBiggerJoyrides.mp4",
        thumbnail_hint: "luxury car",
    },
    AdTemplate {
        title: "Connect-o-Pad 5: Your Digital Canvas",
        description: "Unleash your creativity with the new Connect-o-Pad 5. Faster, lighter, and more powerful.",
        duration: 35,
        video_url: "TearsOfSteel.mp4",
        thumbnail_hint: "tech gadget",
    },
    AdTemplate {
        title: "Apex Airlines: Fly Business Class",
        description: "Experience unparalleled luxury and comfort at 40,000 feet. Your exclusive journey awaits.",
        duration: 60,
        video_url: "WeAreGoingOnAnAdventure.mp4",
        thumbnail_hint: "airline interior",
    },
    AdTemplate {
        title: "Elegance Chronos Watch",
        description: "A masterpiece of Swiss engineering. Timeless design, ultimate precision.",
        duration: 30,
        video_url: "BigBuckBunny.mp4",
        thumbnail_hint: "luxury watch",
    },
    AdTemplate {
        title: "Zenith Smart Watch",
        description: "Track your fitness, stay connected. The future is on your wrist.",
        duration: 40,
        video_url: "ElephantsDream.mp4",
        thumbnail_hint: "smart watch",
    },
    AdTemplate {
        title: "FortressGuard Cyber Security",
        description: "Protect your digital life with our enterprise-grade security suite for personal use.",
        duration: 50,
        video_url: "ForBiggerBlazes.mp4",
        thumbnail_hint: "cyber security",
    },
    AdTemplate {
        title: "Sky-High Drone Pro",
        description: "Capture breathtaking aerial shots with our new professional drone.",
        duration: 55,
        video_url: "ForBiggerEscapes.mp4",
        thumbnail_hint: "drone flying",
    },
    AdTemplate {
        title: "Synapse CRM Software",
        description: "The all-in-one platform to grow your business. Sales, marketing, and support.",
        duration: 35,
        video_url: "SubaruOutbackOnStreetAndDirt.mp4",
        thumbnail_hint: "software interface",
    },
    AdTemplate {
        title: "Azure Vista Real Estate",
        description: "Find your luxury dream home with our exclusive property listings.",
        duration: 50,
        video_url: "VolkswagenGTIReview.mp4",
        thumbnail_hint: "luxury home",
    },
    AdTemplate {
        title: "Global Platinum Card",
        description: "Unlock a world of benefits with the ultimate travel and lifestyle credit card.",
        duration: 40,
        video_url: "WhatCarCanYouGetForAGrand.mp4",
        thumbnail_hint: "credit card",
    },
    AdTemplate {
        title: "Starlight Resorts & Spas",
        description: "Indulge in 7-star luxury at our exclusive resorts. Your private paradise.",
        duration: 60,
        video_url: "ForBiggerMeltdowns.mp4",
        thumbnail_hint: "luxury resort",
    },
];

/// Immutable, generated advertisement catalog.
#[derive(Debug, Clone)]
pub struct AdCatalog {
    ads: Vec<Advertisement>,
}

impl AdCatalog {
    /// Generates `count` ads by cycling the template set.
    ///
    /// # Arguments
    ///
    /// * `count` - Number of ads to generate (0 yields an empty catalog)
    /// * `rate_per_second` - Reward per second of duration
    pub fn generate(count: usize, rate_per_second: f64) -> Self {
        let ads = (0..count)
            .map(|i| {
                let template = &BASE_ADS[i % BASE_ADS.len()];
                let id = (i + 1).to_string();
                Advertisement {
                    title: template.title.to_string(),
                    description: template.description.to_string(),
                    reward: f64::from(template.duration) * rate_per_second,
                    duration: template.duration,
                    video_url: format!("{}/{}", VIDEO_BUCKET, template.video_url),
                    // Unique per ad so clients don't serve a cached image for a different id
                    thumbnail_url: format!("https://picsum.photos/seed/{}/600/400", id),
                    thumbnail_hint: template.thumbnail_hint.to_string(),
                    id,
                }
            })
            .collect();

        Self { ads }
    }

    /// Looks an ad up by its stringified 1-based index.
    ///
    /// The id must be a whole integer (surrounding whitespace allowed): a
    /// trailing suffix such as `"1abc"` is not found rather than read as `1`.
    ///
    /// # Returns
    ///
    /// * `Some(&Advertisement)` - The ad at position `id - 1`
    /// * `None` - `id` is not an integer in `[1, len]`
    pub fn get(&self, id: &str) -> Option<&Advertisement> {
        let position: usize = id.trim().parse().ok()?;
        position.checked_sub(1).and_then(|index| self.ads.get(index))
    }

    /// Returns up to `limit` ads starting at `offset`.
    pub fn page(&self, offset: usize, limit: usize) -> &[Advertisement] {
        let start = offset.min(self.ads.len());
        let end = start.saturating_add(limit).min(self.ads.len());
        &self.ads[start..end]
    }

    /// All ads in id order.
    pub fn ads(&self) -> &[Advertisement] {
        &self.ads
    }

    pub fn len(&self) -> usize {
        self.ads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ads.is_empty()
    }
}

impl Default for AdCatalog {
    fn default() -> Self {
        Self::generate(DEFAULT_CATALOG_SIZE, REWARD_RATE_PER_SECOND)
    }
}
