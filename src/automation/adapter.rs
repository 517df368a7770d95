use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::automation::locator::{FieldSpec, Locator, ProfileField};

/// Site family a URL belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    #[serde(rename = "linkedin")]
    #[strum(serialize = "linkedin")]
    LinkedIn,
    Indeed,
    Glassdoor,
    Generic,
}

/// Locator strategy and feature flags for one site family.
///
/// Adapters hold no state and no control flow of their own; the interaction
/// engine interprets them.
#[derive(Debug, Clone, Copy)]
pub struct SiteAdapter {
    pub name: &'static str,
    pub platform: Platform,
    /// Hostname fragment matched against the target URL. Empty for the fallback.
    pub domain_fragment: &'static str,
    /// Control that opens the application form.
    pub entry: &'static [Locator],
    pub fields: &'static [FieldSpec],
    pub file_input: &'static [Locator],
    pub cover_letter: &'static [Locator],
    /// "Continue"/"Next" controls of multi-step forms.
    pub continue_controls: &'static [Locator],
    pub submit: &'static [Locator],
    pub multi_step: bool,
    /// No confident submission is possible; report success for a human to check.
    pub requires_manual_review: bool,
}

impl SiteAdapter {
    pub fn matches(&self, url: &str) -> bool {
        !self.domain_fragment.is_empty() && url.contains(self.domain_fragment)
    }
}

pub const COMMON_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        field: ProfileField::FirstName,
        candidates: &[
            Locator::css("input[name=\"firstName\"]"),
            Locator::css("input[id*=\"first\"]"),
            Locator::css("input[placeholder*=\"First\"]"),
        ],
    },
    FieldSpec {
        field: ProfileField::LastName,
        candidates: &[
            Locator::css("input[name=\"lastName\"]"),
            Locator::css("input[id*=\"last\"]"),
            Locator::css("input[placeholder*=\"Last\"]"),
        ],
    },
    FieldSpec {
        field: ProfileField::Email,
        candidates: &[
            Locator::css("input[name=\"email\"]"),
            Locator::css("input[type=\"email\"]"),
            Locator::css("input[id*=\"email\"]"),
        ],
    },
    FieldSpec {
        field: ProfileField::Phone,
        candidates: &[
            Locator::css("input[name=\"phone\"]"),
            Locator::css("input[type=\"tel\"]"),
            Locator::css("input[id*=\"phone\"]"),
        ],
    },
];

const FILE_INPUT: &[Locator] = &[Locator::css("input[type=\"file\"]")];

const COVER_LETTER: &[Locator] = &[
    Locator::css("textarea[name*=\"cover\"]"),
    Locator::css("textarea[id*=\"cover\"]"),
    Locator::css("textarea[placeholder*=\"over letter\"]"),
];

pub const LINKEDIN: SiteAdapter = SiteAdapter {
    name: "LinkedIn",
    platform: Platform::LinkedIn,
    domain_fragment: "linkedin.com",
    entry: &[Locator::button("Easy Apply")],
    fields: COMMON_FIELDS,
    file_input: FILE_INPUT,
    cover_letter: COVER_LETTER,
    continue_controls: &[
        Locator::button("Continue"),
        Locator::button("Next"),
        Locator::button("Review"),
    ],
    submit: &[Locator::button("Submit application"), Locator::button("Submit")],
    multi_step: true,
    requires_manual_review: false,
};

pub const INDEED: SiteAdapter = SiteAdapter {
    name: "Indeed",
    platform: Platform::Indeed,
    domain_fragment: "indeed.com",
    entry: &[
        Locator::button("Apply now"),
        Locator::css("button.jobsearch-IndeedApplyButton"),
    ],
    fields: COMMON_FIELDS,
    file_input: FILE_INPUT,
    cover_letter: COVER_LETTER,
    continue_controls: &[],
    submit: &[
        Locator::button("Submit your application"),
        Locator::button("Submit"),
    ],
    multi_step: false,
    requires_manual_review: false,
};

pub const GLASSDOOR: SiteAdapter = SiteAdapter {
    name: "Glassdoor",
    platform: Platform::Glassdoor,
    domain_fragment: "glassdoor.com",
    entry: &[Locator::button("Apply Now"), Locator::button("Easy Apply")],
    fields: COMMON_FIELDS,
    file_input: FILE_INPUT,
    cover_letter: COVER_LETTER,
    continue_controls: &[],
    submit: &[Locator::button("Submit application"), Locator::button("Submit")],
    multi_step: false,
    requires_manual_review: false,
};

pub const GENERIC: SiteAdapter = SiteAdapter {
    name: "Generic",
    platform: Platform::Generic,
    domain_fragment: "",
    entry: &[],
    fields: COMMON_FIELDS,
    file_input: FILE_INPUT,
    cover_letter: COVER_LETTER,
    continue_controls: &[],
    submit: &[],
    multi_step: false,
    requires_manual_review: true,
};

/// Named platforms in match order. The generic adapter is not part of the
/// registry; it is what the dispatcher falls back to.
pub const REGISTERED_ADAPTERS: &[SiteAdapter] = &[LINKEDIN, INDEED, GLASSDOOR];
