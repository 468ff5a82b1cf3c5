//! Server-rendered single page. Sections are a fixed ordered list of render
//! functions; the page is static apart from the comment list.

use crate::sanitize::{escape_text, sanitize_html};
use crate::store::Comment;
use crate::utils::display_timestamp;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub title: String,
    pub headline: String,
    pub tagline: String,
    pub about: Vec<String>,
    pub projects: Vec<Project>,
    pub testimonials: Vec<Testimonial>,
    pub contact_email: Option<String>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Testimonial {
    pub author: String,
    #[serde(default)]
    pub role: Option<String>,
    pub quote: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            title: "Portfolio".into(),
            headline: "Websites and systems that ship".into(),
            tagline: "Design, development and support for small businesses.".into(),
            about: vec!["Developer focused on fast, accessible websites.".into()],
            projects: Vec::new(),
            testimonials: Vec::new(),
            contact_email: None,
            links: Vec::new(),
        }
    }
}

impl SiteProfile {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read site file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid site file {}", path.display()))
    }
}

pub struct PageContext<'a> {
    pub profile: &'a SiteProfile,
    pub comments: &'a [Comment],
}

pub struct Section {
    pub id: &'static str,
    pub label: &'static str,
    pub render: fn(&PageContext<'_>) -> String,
}

pub const SECTIONS: &[Section] = &[
    Section {
        id: "hero",
        label: "Home",
        render: render_hero,
    },
    Section {
        id: "about",
        label: "About",
        render: render_about,
    },
    Section {
        id: "projects",
        label: "Projects",
        render: render_projects,
    },
    Section {
        id: "testimonials",
        label: "Testimonials",
        render: render_testimonials,
    },
    Section {
        id: "comments",
        label: "Comments",
        render: render_comments,
    },
    Section {
        id: "contact",
        label: "Contact",
        render: render_contact,
    },
];

pub fn render_page(ctx: &PageContext<'_>) -> String {
    let mut page = String::new();
    let _ = write!(
        page,
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>{}</title></head><body>",
        escape_text(&ctx.profile.title)
    );
    page.push_str("<header><nav><ul>");
    for section in SECTIONS {
        let _ = write!(
            page,
            "<li><a href=\"#{}\">{}</a></li>",
            section.id, section.label
        );
    }
    page.push_str("</ul></nav></header><main>");
    for section in SECTIONS {
        let _ = write!(page, "<section id=\"{}\">", section.id);
        page.push_str(&(section.render)(ctx));
        page.push_str("</section>");
    }
    page.push_str("</main>");
    page.push_str(&render_footer(ctx.profile));
    page.push_str("</body></html>");
    page
}

fn render_hero(ctx: &PageContext<'_>) -> String {
    format!(
        "<h1>{}</h1><p>{}</p><a href=\"#contact\">Get in touch</a>",
        escape_text(&ctx.profile.headline),
        escape_text(&ctx.profile.tagline)
    )
}

fn render_about(ctx: &PageContext<'_>) -> String {
    let mut html = String::from("<h2>About</h2>");
    for paragraph in &ctx.profile.about {
        let _ = write!(html, "<p>{}</p>", escape_text(paragraph));
    }
    html
}

fn render_projects(ctx: &PageContext<'_>) -> String {
    let mut html = String::from("<h2>Projects</h2>");
    if ctx.profile.projects.is_empty() {
        html.push_str("<p>Projects coming soon.</p>");
        return html;
    }
    html.push_str("<ul>");
    for project in &ctx.profile.projects {
        html.push_str("<li><article>");
        let _ = write!(html, "<h3>{}</h3>", escape_text(&project.name));
        let _ = write!(html, "<p>{}</p>", escape_text(&project.summary));
        if !project.technologies.is_empty() {
            let techs: Vec<String> = project.technologies.iter().map(|t| escape_text(t)).collect();
            let _ = write!(html, "<p>{}</p>", techs.join(", "));
        }
        if let Some(url) = &project.url {
            // Routed through the allow-list so only http(s) links survive.
            html.push_str(&sanitize_html(&format!(
                "<a href=\"{}\">View project</a>",
                escape_text(url)
            )));
        }
        html.push_str("</article></li>");
    }
    html.push_str("</ul>");
    html
}

fn render_testimonials(ctx: &PageContext<'_>) -> String {
    let mut html = String::from("<h2>Testimonials</h2>");
    for testimonial in &ctx.profile.testimonials {
        let attribution = match &testimonial.role {
            Some(role) => format!("{}, {}", escape_text(&testimonial.author), escape_text(role)),
            None => escape_text(&testimonial.author),
        };
        let _ = write!(
            html,
            "<blockquote><p>{}</p><cite>{}</cite></blockquote>",
            escape_text(&testimonial.quote),
            attribution
        );
    }
    html
}

fn render_comments(ctx: &PageContext<'_>) -> String {
    let mut html = String::from("<h2>Comments</h2>");
    if ctx.comments.is_empty() {
        html.push_str("<p>No comments yet. Be the first!</p>");
        return html;
    }
    html.push_str("<ul>");
    for comment in ctx.comments {
        // Rows written straight to the hosted table bypass the server, so
        // messages go through the allow-list again on the way out.
        let _ = write!(
            html,
            "<li data-comment-id=\"{}\"><strong>{}</strong> <time datetime=\"{}\">{}</time><div>{}</div></li>",
            escape_text(&comment.id),
            escape_text(&comment.name),
            comment.created_at.to_rfc3339(),
            display_timestamp(&comment.created_at),
            sanitize_html(&comment.message)
        );
    }
    html.push_str("</ul>");
    html
}

fn render_contact(ctx: &PageContext<'_>) -> String {
    let mut html = String::from(
        "<h2>Contact</h2><p>Send a message through <code>POST /contacts</code>.</p>",
    );
    if let Some(email) = &ctx.profile.contact_email {
        let _ = write!(html, "<p>{}</p>", escape_text(email));
    }
    html
}

fn render_footer(profile: &SiteProfile) -> String {
    let mut html = String::from("<footer>");
    for link in &profile.links {
        html.push_str(&sanitize_html(&format!(
            "<a href=\"{}\">{}</a> ",
            escape_text(&link.url),
            escape_text(&link.label)
        )));
    }
    let _ = write!(html, "<p>{}</p></footer>", escape_text(&profile.title));
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn comment(id: &str, name: &str, message: &str) -> Comment {
        Comment {
            id: id.into(),
            name: name.into(),
            message: message.into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap(),
        }
    }

    #[test]
    fn sections_render_in_declared_order() {
        let profile = SiteProfile::default();
        let page = render_page(&PageContext {
            profile: &profile,
            comments: &[],
        });
        let positions: Vec<usize> = SECTIONS
            .iter()
            .map(|s| page.find(&format!("<section id=\"{}\">", s.id)).expect("section rendered"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(page.contains("No comments yet"));
    }

    #[test]
    fn comment_markup_is_resanitized_and_names_escaped() {
        let profile = SiteProfile::default();
        let comments = [comment(
            "c1",
            "<i>Eve</i>",
            "<b>ok</b><script>alert(1)</script>",
        )];
        let page = render_page(&PageContext {
            profile: &profile,
            comments: &comments,
        });
        assert!(page.contains("<b>ok</b>"));
        assert!(!page.contains("<script>"));
        assert!(!page.contains("<i>Eve</i>"));
        assert!(page.contains("09/03/2024 14:05"));
    }

    #[test]
    fn project_links_must_be_http() {
        let profile = SiteProfile {
            projects: vec![
                Project {
                    name: "Good".into(),
                    summary: "ok".into(),
                    url: Some("https://example.com/good".into()),
                    technologies: vec!["Rust".into()],
                },
                Project {
                    name: "Bad".into(),
                    summary: "nope".into(),
                    url: Some("javascript:alert(1)".into()),
                    technologies: Vec::new(),
                },
            ],
            ..SiteProfile::default()
        };
        let html = render_projects(&PageContext {
            profile: &profile,
            comments: &[],
        });
        assert!(html.contains("href=\"https://example.com/good\""));
        assert!(!html.contains("javascript"));
    }

    #[test]
    fn profile_loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.toml");
        fs::write(
            &path,
            r#"
title = "Studio"
about = ["One", "Two"]

[[testimonials]]
author = "Client"
quote = "Great work"
"#,
        )
        .unwrap();
        let profile = SiteProfile::load(Some(&path)).unwrap();
        assert_eq!(profile.title, "Studio");
        assert_eq!(profile.about.len(), 2);
        assert_eq!(profile.testimonials[0].quote, "Great work");
        assert_eq!(profile.headline, SiteProfile::default().headline);
    }
}
