use scraper::{ElementRef, Html, Selector};

use crate::automation::adapter::Platform;
use crate::models::posting::JobPosting;

/// Keywords recognised as skills, matched case-insensitively against the
/// description text.
pub const SKILL_KEYWORDS: &[&str] = &[
    "JavaScript",
    "TypeScript",
    "Python",
    "Java",
    "C++",
    "React",
    "Angular",
    "Vue",
    "Node.js",
    "Express",
    "Django",
    "Flask",
    "Spring",
    "SQL",
    "MongoDB",
    "PostgreSQL",
    "AWS",
    "Azure",
    "GCP",
    "Docker",
    "Kubernetes",
    "Git",
    "CI/CD",
    "REST",
    "GraphQL",
    "Microservices",
    "Agile",
    "Scrum",
    "Machine Learning",
    "Data Science",
    "TensorFlow",
    "PyTorch",
    "HTML",
    "CSS",
    "Tailwind",
    "Bootstrap",
];

const MAX_REQUIREMENTS: usize = 10;
const MIN_REQUIREMENT_LEN: usize = 10;

/// Section headings that introduce a requirements list, tried in order.
/// Each heading's section ends at a blank line or at one of its terminators.
const REQUIREMENT_SECTIONS: &[(&str, &[&str])] = &[
    ("requirement", &["responsibilities", "qualifications"]),
    ("qualification", &["responsibilities", "requirements"]),
    ("must have", &["nice to have"]),
];

/// How one field is located: CSS selector, and whether to take the first
/// match only or the concatenated text of all matches.
#[derive(Clone, Copy)]
enum Pick {
    First(&'static str),
    Last(&'static str),
    All(&'static str),
}

struct PlatformSelectors {
    title: &'static [Pick],
    company: &'static [Pick],
    location: &'static [Pick],
    description: &'static [Pick],
    salary: &'static [Pick],
    job_type: &'static [Pick],
}

const LINKEDIN: PlatformSelectors = PlatformSelectors {
    title: &[Pick::All(".top-card-layout__title"), Pick::All("h1.topcard__title")],
    company: &[
        Pick::All(".topcard__org-name-link"),
        Pick::First(".top-card-layout__card a"),
    ],
    location: &[
        Pick::All(".topcard__flavor--bullet"),
        Pick::All(".top-card-layout__second-subline"),
    ],
    description: &[
        Pick::All(".show-more-less-html__markup"),
        Pick::All(".description__text"),
    ],
    salary: &[],
    job_type: &[Pick::First(".description__job-criteria-text")],
};

const INDEED: PlatformSelectors = PlatformSelectors {
    title: &[
        Pick::All(".jobsearch-JobInfoHeader-title"),
        Pick::All("h1.icl-u-xs-mb--xs"),
    ],
    company: &[
        Pick::All("[data-company-name=\"true\"]"),
        Pick::First(".jobsearch-InlineCompanyRating"),
    ],
    location: &[Pick::Last(".jobsearch-JobInfoHeader-subtitle div")],
    description: &[Pick::All("#jobDescriptionText")],
    salary: &[Pick::All(".icl-u-xs-mr--xs")],
    job_type: &[],
};

const GLASSDOOR: PlatformSelectors = PlatformSelectors {
    title: &[Pick::All("[data-test=\"job-title\"]")],
    company: &[Pick::All("[data-test=\"employer-name\"]")],
    location: &[Pick::All("[data-test=\"location\"]")],
    description: &[Pick::All("[data-test=\"description\"]")],
    salary: &[Pick::All("[data-test=\"salary\"]")],
    job_type: &[],
};

const GENERIC: PlatformSelectors = PlatformSelectors {
    title: &[Pick::First("h1"), Pick::First("[class*=\"title\"]")],
    company: &[Pick::First("[class*=\"company\"]")],
    location: &[Pick::First("[class*=\"location\"]")],
    description: &[Pick::All("[class*=\"description\"]"), Pick::All("main")],
    salary: &[],
    job_type: &[],
};

fn selectors_for(platform: Platform) -> &'static PlatformSelectors {
    match platform {
        Platform::LinkedIn => &LINKEDIN,
        Platform::Indeed => &INDEED,
        Platform::Glassdoor => &GLASSDOOR,
        Platform::Generic => &GENERIC,
    }
}

/// Extract a structured job posting from a page's HTML.
///
/// Each field takes the first non-empty candidate of the platform's selector
/// chain. Title and company fall back to placeholders so a stored posting is
/// always displayable.
pub fn extract_posting(html: &str, url: &str, platform: Platform) -> Result<JobPosting, ExtractionError> {
    let document = Html::parse_document(html);
    let selectors = selectors_for(platform);

    let title = first_text(&document, selectors.title)?;
    let company = first_text(&document, selectors.company)?;
    let description = first_text(&document, selectors.description)?;

    Ok(JobPosting {
        url: url.to_string(),
        title: if title.is_empty() { "Unknown Title".to_string() } else { title },
        company: if company.is_empty() { "Unknown Company".to_string() } else { company },
        location: first_text(&document, selectors.location)?,
        requirements: extract_requirements(&description),
        skills: extract_skills(&description),
        salary: first_text(&document, selectors.salary)?,
        job_type: first_text(&document, selectors.job_type)?,
        description,
    })
}

fn first_text(document: &Html, picks: &[Pick]) -> Result<String, ExtractionError> {
    for pick in picks {
        let text = pick_text(document, *pick)?;
        if !text.is_empty() {
            return Ok(text);
        }
    }
    Ok(String::new())
}

fn pick_text(document: &Html, pick: Pick) -> Result<String, ExtractionError> {
    let css = match pick {
        Pick::First(css) | Pick::Last(css) | Pick::All(css) => css,
    };
    let selector =
        Selector::parse(css).map_err(|e| ExtractionError::Selector(format!("{css}: {e}")))?;
    let mut matches = document.select(&selector);

    let text = match pick {
        Pick::First(_) => matches.next().map(element_text).unwrap_or_default(),
        Pick::Last(_) => matches.last().map(element_text).unwrap_or_default(),
        Pick::All(_) => matches.map(element_text).collect::<String>(),
    };
    Ok(text.trim().to_string())
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Known skill keywords present in the description, in keyword-list order.
pub fn extract_skills(description: &str) -> Vec<String> {
    let text = description.to_lowercase();
    SKILL_KEYWORDS
        .iter()
        .filter(|skill| text.contains(&skill.to_lowercase()))
        .map(|skill| skill.to_string())
        .collect()
}

/// Requirement lines from the first "requirements", "qualifications" or
/// "must have" section of the description. Only the first heading found is
/// used, even if none of its lines qualify.
pub fn extract_requirements(description: &str) -> Vec<String> {
    // ASCII lowering keeps byte offsets valid for `description`.
    let lower = description.to_ascii_lowercase();

    for (heading, terminators) in REQUIREMENT_SECTIONS {
        let Some(start) = lower.find(heading) else {
            continue;
        };
        let after = start + heading.len();
        let body_start = after + skip_len(&lower[after..]);

        let rest = &lower[body_start..];
        let end = std::iter::once("\n\n")
            .chain(terminators.iter().copied())
            .filter_map(|t| rest.find(t))
            .min()
            .unwrap_or(rest.len());

        let section = &description[body_start..body_start + end];
        return section
            .split(['\n', '•', '·', '-'])
            .map(str::trim)
            .filter(|item| item.len() > MIN_REQUIREMENT_LEN)
            .take(MAX_REQUIREMENTS)
            .map(str::to_string)
            .collect();
    }

    Vec::new()
}

/// Length of an optional plural "s", optional ":" and following whitespace.
fn skip_len(s: &str) -> usize {
    let rest = s.strip_prefix('s').unwrap_or(s);
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    s.len() - rest.trim_start().len()
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Invalid selector {0}")]
    Selector(String),
}
