//! Fixed word lists used by threat scoring, categorization and impact notes.
//!
//! All matching is case-insensitive substring matching against the
//! lower-cased post text, so multi-word entries match as phrases.

/// Negative and crisis words counted by the content factor.
pub const THREAT_LEXICON: &[&str] = &[
    "scam",
    "fraud",
    "terrible",
    "awful",
    "worst",
    "hate",
    "boycott",
    "lawsuit",
    "legal action",
    "complaint",
    "refund",
    "broken",
    "defective",
    "dangerous",
    "unsafe",
    "toxic",
    "avoid",
    "warning",
    "alert",
];

/// Subreddits whose front pages reach a general audience.
pub const HIGH_REACH_SUBREDDITS: &[&str] = &["all", "popular", "technology", "business", "news"];

pub struct ThreatCategory {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

impl ThreatCategory {
    pub fn matches(&self, text_lower: &str) -> bool {
        self.keywords.iter().any(|keyword| text_lower.contains(keyword))
    }
}

pub const THREAT_CATEGORIES: &[ThreatCategory] = &[
    ThreatCategory {
        name: "iPhone Issues",
        keywords: &[
            "iphone",
            "battery drain",
            "screen crack",
            "camera issue",
            "face id",
            "touch id",
            "charging problem",
            "overheating",
            "ios bug",
            "phone",
            "mobile",
            "cellular",
        ],
    },
    ThreatCategory {
        name: "Mac Problems",
        keywords: &[
            "macbook",
            "imac",
            "mac pro",
            "mac studio",
            "mac mini",
            "keyboard issue",
            "screen problem",
            "thermal throttling",
            "logic board",
            "mac",
            "laptop",
            "desktop",
            "computer",
        ],
    },
    ThreatCategory {
        name: "iPad Concerns",
        keywords: &[
            "ipad",
            "apple pencil",
            "magic keyboard",
            "stage manager",
            "multitasking",
            "app compatibility",
            "tablet",
        ],
    },
    ThreatCategory {
        name: "Apple Watch",
        keywords: &[
            "apple watch",
            "watchos",
            "battery life",
            "heart rate",
            "fitness tracking",
            "band issue",
            "watch",
            "wearable",
            "smartwatch",
        ],
    },
    ThreatCategory {
        name: "AirPods/Audio",
        keywords: &[
            "airpods",
            "airpods pro",
            "airpods max",
            "homepod",
            "audio quality",
            "noise cancellation",
            "connection issue",
            "headphones",
            "earbuds",
            "speaker",
        ],
    },
    ThreatCategory {
        name: "Software Bugs",
        keywords: &[
            "ios",
            "macos",
            "ipados",
            "watchos",
            "tvos",
            "bug",
            "crash",
            "freeze",
            "slow performance",
            "update issue",
            "software",
            "operating system",
            "os",
        ],
    },
    ThreatCategory {
        name: "App Store Issues",
        keywords: &[
            "app store",
            "app review",
            "app rejection",
            "developer",
            "subscription",
            "in-app purchase",
            "apps",
            "application",
        ],
    },
    ThreatCategory {
        name: "Apple Services",
        keywords: &[
            "icloud",
            "apple music",
            "apple tv+",
            "apple pay",
            "apple card",
            "apple fitness+",
            "siri",
            "facetime",
            "services",
            "streaming",
            "cloud",
        ],
    },
    ThreatCategory {
        name: "Pricing Concerns",
        keywords: &[
            "overpriced",
            "expensive",
            "apple tax",
            "rip off",
            "money grab",
            "subscription cost",
            "upgrade cost",
            "price",
            "cost",
        ],
    },
    ThreatCategory {
        name: "Privacy/Security",
        keywords: &[
            "privacy",
            "data collection",
            "tracking",
            "security breach",
            "app tracking transparency",
            "data leak",
            "security",
            "private",
        ],
    },
    ThreatCategory {
        name: "Repair/Support",
        keywords: &[
            "genius bar",
            "apple support",
            "applecare",
            "repair cost",
            "right to repair",
            "third party repair",
            "repair",
            "support",
            "warranty",
        ],
    },
    ThreatCategory {
        name: "Competition",
        keywords: &[
            "android",
            "samsung",
            "google",
            "microsoft",
            "competitor",
            "alternative",
            "better option",
            "switch to",
            "vs",
            "versus",
            "compare",
        ],
    },
    ThreatCategory {
        name: "Environmental",
        keywords: &[
            "e-waste",
            "sustainability",
            "carbon neutral",
            "recycling",
            "environmental impact",
            "environment",
            "green",
            "eco",
        ],
    },
    ThreatCategory {
        name: "Legal/Regulatory",
        keywords: &[
            "lawsuit",
            "antitrust",
            "monopoly",
            "app store monopoly",
            "epic games",
            "eu regulation",
            "dma",
            "legal",
            "court",
            "regulation",
        ],
    },
    ThreatCategory {
        name: "Product Launch",
        keywords: &[
            "wwdc",
            "apple event",
            "new product",
            "rumor",
            "leak",
            "announcement",
            "disappointment",
            "launch",
            "release",
            "keynote",
        ],
    },
    ThreatCategory {
        name: "Accessibility",
        keywords: &[
            "accessibility",
            "voiceover",
            "assistive touch",
            "hearing aid",
            "disability support",
            "accessible",
            "disability",
        ],
    },
    ThreatCategory {
        name: "General Apple",
        keywords: &[
            "apple",
            "cupertino",
            "tim cook",
            "steve jobs",
            "apple park",
            "infinite loop",
        ],
    },
];

/// Number of distinct lexicon entries present in `text_lower`.
pub fn threat_word_count(text_lower: &str) -> usize {
    THREAT_LEXICON
        .iter()
        .filter(|word| text_lower.contains(*word))
        .count()
}

/// Names of every category with at least one keyword in `text_lower`, in
/// table order.
pub fn categories_for(text_lower: &str) -> Vec<String> {
    THREAT_CATEGORIES
        .iter()
        .filter(|category| category.matches(text_lower))
        .map(|category| category.name.to_string())
        .collect()
}

pub fn is_high_reach(subreddit: &str) -> bool {
    let subreddit = subreddit.to_lowercase();
    HIGH_REACH_SUBREDDITS.contains(&subreddit.as_str())
}
