//! Subject/body template rendering.

use chrono::{DateTime, Utc};

/// Values substituted into subject/body templates.
#[derive(Debug, Clone)]
pub struct TemplateVars {
    /// Target mailbox address (`{box}`).
    pub mailbox: String,
    /// Dispatch timestamp (`{date}`).
    pub date: DateTime<Utc>,
    /// Attachment count for the email (`{count}`).
    pub count: u32,
    /// Requester display identity (`{user}`).
    pub user: String,
}

/// Render a template by plain placeholder substitution.
///
/// Unknown placeholders are left untouched.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    template
        .replace("{box}", &vars.mailbox)
        .replace("{date}", &vars.date.format("%Y-%m-%d").to_string())
        .replace("{count}", &vars.count.to_string())
        .replace("{user}", &vars.user)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn vars() -> TemplateVars {
        TemplateVars {
            mailbox: "intake@example.test".to_string(),
            date: Utc.with_ymd_and_hms(2026, 8, 26, 9, 0, 0).unwrap(),
            count: 3,
            user: "clerk-7".to_string(),
        }
    }

    #[test]
    fn substitutes_all_placeholders() {
        let rendered = render("{count} docs to {box} on {date} by {user}", &vars());
        assert_eq!(
            rendered,
            "3 docs to intake@example.test on 2026-08-26 by clerk-7"
        );
    }

    #[test]
    fn unknown_placeholders_survive() {
        assert_eq!(render("hello {nope}", &vars()), "hello {nope}");
    }

    #[test]
    fn repeated_placeholders_all_replaced() {
        assert_eq!(render("{count}/{count}", &vars()), "3/3");
    }
}
