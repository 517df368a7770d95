//! Job posting pages used by the scrape tests

#![allow(dead_code)]

pub const LINKEDIN_URL: &str = "https://www.linkedin.com/jobs/view/3912345678";

pub const LINKEDIN_POSTING: &str = r#"<!DOCTYPE html>
<html>
<head><title>Backend Engineer | LinkedIn</title></head>
<body>
  <section class="top-card-layout">
    <div class="top-card-layout__card">
      <h1 class="top-card-layout__title">Backend Engineer</h1>
      <a class="topcard__org-name-link" href="/company/northwind">Northwind Traders</a>
      <span class="topcard__flavor--bullet">Remote, EU</span>
    </div>
  </section>
  <div class="show-more-less-html__markup">
Northwind is hiring a backend engineer to own our order pipeline.

Requirements:
- 4+ years of professional Python or Go experience
- Production experience with PostgreSQL and Redis
- Comfortable with Docker and Kubernetes deployments

Nice to have: GraphQL
  </div>
  <ul>
    <li><span class="description__job-criteria-text">Full-time</span></li>
    <li><span class="description__job-criteria-text">Engineering</span></li>
  </ul>
</body>
</html>"#;

pub const GENERIC_URL: &str = "https://careers.example.org/openings/42";

pub const GENERIC_POSTING: &str = r#"<!DOCTYPE html>
<html>
<body>
  <header><h1>Frontend Developer</h1></header>
  <div class="company-name">Example Org</div>
  <div class="job-location">Lisbon</div>
  <main>
    <div class="job-description">
Build accessible interfaces with React, TypeScript and CSS.

Qualifications:
• Three years shipping React applications
• Familiarity with REST APIs and Git workflows
    </div>
  </main>
</body>
</html>"#;

pub const EMPTY_PAGE: &str = "<html><head></head><body></body></html>";
