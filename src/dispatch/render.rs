// src/dispatch/render.rs
//! Newsletter rendering. Plain inline-styled HTML plus a text alternative.

use chrono::NaiveDate;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use super::Edition;
use crate::normalize::dedup_by_title;

const NEWS_IN_MAIL: usize = 6;
const EVENTS_IN_MAIL: usize = 6;

pub fn subject(prefix: &str, city: &str, date: NaiveDate) -> String {
    format!("{prefix}: {city}, {}", date.format("%A, %B %-d"))
}

fn section(out: &mut String, title: &str) {
    out.push_str(&format!(
        "<h2 style=\"font-size:18px;margin:24px 0 8px\">{}</h2>\n",
        text(title)
    ));
}

fn link(href: &str, label: &str) -> String {
    format!("<a href=\"{}\">{}</a>", attr(href), text(label))
}

pub fn render_html(ed: &Edition) -> String {
    let mut out = String::new();
    out.push_str("<!doctype html>\n<html><body style=\"font-family:Helvetica,Arial,sans-serif;max-width:600px;margin:auto\">\n");
    let date = ed
        .date
        .map(|d| d.format("%A, %B %-d").to_string())
        .unwrap_or_default();
    out.push_str(&format!(
        "<h1 style=\"font-size:24px\">Good morning, {}!</h1>\n<p>{}</p>\n",
        text(&ed.city),
        text(&date)
    ));

    if let Some(w) = &ed.weather {
        section(&mut out, "Weather");
        out.push_str(&format!(
            "<p>{} · High {}°{} / Low {}°{} · Wind {}</p>\n",
            text(&w.condition),
            w.high,
            w.unit,
            w.low,
            w.unit,
            text(&w.wind_label())
        ));
    }

    if let Some(brief) = ed.brief.as_ref().filter(|b| !b.brief.is_empty()) {
        section(&mut out, "Today's brief");
        out.push_str("<ul>\n");
        for item in &brief.brief {
            out.push_str(&format!("<li>{}</li>\n", text(&item.title)));
        }
        out.push_str("</ul>\n");
    }

    if let Some(news) = ed.news.as_ref().filter(|n| !n.is_empty()) {
        section(&mut out, "News");
        let news = dedup_by_title(news.clone(), |n| n.title.as_str());
        for n in news.iter().take(NEWS_IN_MAIL) {
            out.push_str(&format!(
                "<p><strong>{}</strong><br>{}</p>\n",
                link(&n.link, &n.title),
                text(&n.summary)
            ));
        }
    }

    if let Some(events) = ed.events.as_ref().filter(|e| !e.is_empty()) {
        section(&mut out, "Events");
        for e in events.iter().take(EVENTS_IN_MAIL) {
            let title = if e.link.is_empty() {
                text(&e.title).to_string()
            } else {
                link(&e.link, &e.title)
            };
            out.push_str(&format!(
                "<p><strong>{}</strong> <em>{}</em><br>{} · {}</p>\n",
                title,
                text(e.category.as_str()),
                text(&e.date),
                text(&e.venue)
            ));
        }
    }

    if let Some(sports) = ed.sports.as_ref().filter(|s| s.has_content()) {
        section(&mut out, "Sports");
        out.push_str(&format!("<p>{}</p>\n", text(&sports.summary)));
        if !sports.matches.is_empty() {
            out.push_str("<ul>\n");
            for m in &sports.matches {
                out.push_str(&format!(
                    "<li>{} · {} {}</li>\n",
                    text(&m.teams),
                    text(&m.date),
                    text(&m.time)
                ));
            }
            out.push_str("</ul>\n");
        }
        if !sports.read_more_link.is_empty() {
            out.push_str(&format!("<p>{}</p>\n", link(&sports.read_more_link, "Read more")));
        }
    }

    out.push_str("</body></html>\n");
    out
}

pub fn render_text(ed: &Edition) -> String {
    let mut out = format!("Good morning, {}!\n", ed.city);
    if let Some(d) = ed.date {
        out.push_str(&format!("Here's your daily update for {}\n", d.format("%A, %B %-d")));
    }
    if let Some(w) = &ed.weather {
        out.push_str(&format!(
            "\nWEATHER:\n{} - High {}°{} / Low {}°{}\n",
            w.condition, w.high, w.unit, w.low, w.unit
        ));
    }
    out.push_str("\nTODAY'S BRIEF:\n");
    match ed.brief.as_ref().filter(|b| !b.brief.is_empty()) {
        Some(b) => {
            for item in &b.brief {
                out.push_str(&format!("• {}\n", item.title));
            }
        }
        None => out.push_str("No updates today\n"),
    }
    if let Some(events) = ed.events.as_ref().filter(|e| !e.is_empty()) {
        out.push_str("\nEVENTS:\n");
        for e in events.iter().take(EVENTS_IN_MAIL) {
            out.push_str(&format!("• {} ({})\n", e.title, e.date));
        }
    }
    out
}
