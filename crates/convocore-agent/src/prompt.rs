use chrono::Utc;
use convocore_storage::types::{Agent, Skill, User};

/// Assembles the six-part system message list for one agent turn.
/// Order is significant: identity first, user's global prompt
/// next, then progressively more volatile context last, mirroring this
/// codebase's tiered-prompt convention of putting anything that changes
/// turn-to-turn at the end so the common prefix stays stable.
pub fn assemble_system_messages(
    agent: &Agent,
    user: &User,
    enabled_skills: &[Skill],
    other_agents: &[Agent],
) -> Vec<String> {
    let mut parts = Vec::with_capacity(6);

    parts.push(format!("You are {}. {}", agent.name, agent.system_prompt));

    if !user.system_prompt.is_empty() {
        parts.push(user.system_prompt.clone());
    }

    let preferred = user.preferred_name.as_deref().unwrap_or(&user.name);
    parts.push(format!(
        "The user prefers to be called {preferred}. The current time is {}.",
        Utc::now().to_rfc3339()
    ));

    if let Some(memory) = &agent.memory {
        if !memory.is_empty() {
            parts.push(format!("What you remember from past sessions:\n{memory}"));
        }
    }

    if !enabled_skills.is_empty() {
        let names: Vec<&str> = enabled_skills.iter().map(|s| s.name.as_str()).collect();
        parts.push(format!(
            "You have the following skills available; fetch full instructions with \
             get_skill_instructions(name) when needed: {}.",
            names.join(", ")
        ));
    }

    if !other_agents.is_empty() {
        let descriptions: Vec<String> = other_agents.iter().map(|a| a.description_line()).collect();
        parts.push(format!("Other agents available to this user:\n{}", descriptions.join("\n")));
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str, prompt: &str) -> Agent {
        Agent {
            id: "a1".into(),
            user_id: "u1".into(),
            name: name.into(),
            system_prompt: prompt.into(),
            model_name: "gpt".into(),
            voice_reference: None,
            avatar: None,
            excluded_tools: vec![],
            think_mode: false,
            memory: None,
            trigger_word: None,
            is_administrator: false,
            created_at: "".into(),
            updated_at: "".into(),
        }
    }

    fn user() -> User {
        User {
            id: "u1".into(),
            name: "alice".into(),
            password_hash: "".into(),
            system_prompt: "be concise".into(),
            preferred_name: Some("Al".into()),
            default_model_url: None,
            summary_model: None,
            created_at: "".into(),
            updated_at: "".into(),
        }
    }

    #[test]
    fn assembles_in_six_part_order_skipping_empty_sections() {
        let a = agent("Scout", "You help find things.");
        let parts = assemble_system_messages(&a, &user(), &[], &[]);
        assert_eq!(parts.len(), 3);
        assert!(parts[0].contains("Scout"));
        assert!(parts[1].contains("be concise"));
        assert!(parts[2].contains("Al"));
    }

    #[test]
    fn includes_memory_skills_and_other_agents_when_present() {
        let mut a = agent("Scout", "help");
        a.memory = Some("likes jazz".into());
        let skill = Skill { id: "s1".into(), user_id: "u1".into(), name: "cooking".into(), instructions: "".into(), created_at: "".into(), updated_at: "".into() };
        let other = agent("Chef", "cooks");
        let parts = assemble_system_messages(&a, &user(), &[skill], std::slice::from_ref(&other));
        assert_eq!(parts.len(), 6);
        assert!(parts[3].contains("jazz"));
        assert!(parts[4].contains("cooking"));
        assert!(parts[5].contains("Chef"));
    }
}
