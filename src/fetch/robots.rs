//! Minimal robots.txt evaluation: user-agent groups with Allow/Disallow rules,
//! `*` wildcards and `$` end anchors. The longest matching rule wins; Allow wins ties.

use regex::Regex;
use tracing::trace;

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    len: usize,
    pattern: Regex,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    groups: Vec<Group>,
}

impl RobotsPolicy {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut in_agents = false;

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if value.is_empty() {
                        continue;
                    }
                    // A user-agent line after rules starts a new group.
                    if !in_agents && !current.agents.is_empty() {
                        groups.push(std::mem::take(&mut current));
                    }
                    current.agents.push(value.to_ascii_lowercase());
                    in_agents = true;
                }
                "allow" | "disallow" => {
                    in_agents = false;
                    if current.agents.is_empty() {
                        continue;
                    }
                    // An empty Disallow means "allow everything".
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(pattern) = compile(value) {
                        current.rules.push(Rule {
                            allow: key == "allow",
                            len: value.len(),
                            pattern,
                        });
                    }
                }
                _ => {}
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }
        Self { groups }
    }

    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let ua = user_agent.to_ascii_lowercase();
        let specific = self
            .groups
            .iter()
            .find(|g| g.agents.iter().any(|a| a != "*" && ua.contains(a.as_str())));
        let group = specific.or_else(|| {
            self.groups
                .iter()
                .find(|g| g.agents.iter().any(|a| a == "*"))
        });
        let Some(group) = group else {
            return true;
        };

        let path = if path.is_empty() { "/" } else { path };
        let verdict = group
            .rules
            .iter()
            .filter(|r| r.pattern.is_match(path))
            .max_by_key(|r| (r.len, r.allow))
            .map(|r| r.allow)
            .unwrap_or(true);
        trace!(path, verdict, "robots check");
        verdict
    }
}

fn compile(rule: &str) -> Option<Regex> {
    let anchored = rule.ends_with('$');
    let body = rule.trim_end_matches('$');
    let mut re = String::from("^");
    for (i, part) in body.split('*').enumerate() {
        if i > 0 {
            re.push_str(".*");
        }
        re.push_str(&regex::escape(part));
    }
    if anchored {
        re.push('$');
    }
    Regex::new(&re).ok()
}
