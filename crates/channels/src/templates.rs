//! Customer-facing copy for the orchestration fallback paths. Kept in one
//! place so wording changes never touch control flow.

/// Appended to an automated reply when the question has been escalated.
pub fn escalation_wait_notice() -> String {
    "I'm checking with the team to make sure I give you the right answer. \
     I'll get back to you here shortly."
        .to_owned()
}

/// Returned when a pending manager query passed its wait window unanswered.
pub fn escalation_expiry_fallback() -> String {
    "Sorry for the wait — I couldn't reach the team just now. We'll follow up \
     with you here as soon as possible."
        .to_owned()
}

/// Enhanced handoff after outbound delivery failed twice. Includes a direct
/// contact when one is known so the customer always has a human-reachable path.
pub fn delivery_fallback(manager_contact: Option<(&str, &str)>) -> String {
    match manager_contact {
        Some((name, phone)) => format!(
            "We're having trouble replying through this channel right now. \
             Please reach {name} directly on {phone} and they'll help you straight away."
        ),
        None => "We're having trouble replying through this channel right now. \
                 Please bear with us — we'll follow up as soon as we can."
            .to_owned(),
    }
}

/// Professional redirect for questions outside the business's scope.
pub fn off_topic_redirect() -> String {
    "That's a bit outside what I can help with here. If you have any questions \
     about our services, opening times, or bookings, I'm happy to help."
        .to_owned()
}

/// Two-step confirmation prompt for a destructive manager command.
pub fn confirmation_prompt(summary: &str, booking_count: u32, booking_summaries: &[String]) -> String {
    let mut prompt = format!("Before I do that: {summary}");
    if booking_count > 0 {
        prompt.push_str(&format!(
            "\nThere {} {} confirmed booking{} today",
            if booking_count == 1 { "is" } else { "are" },
            booking_count,
            if booking_count == 1 { "" } else { "s" },
        ));
        if booking_summaries.is_empty() {
            prompt.push('.');
        } else {
            prompt.push(':');
            for line in booking_summaries {
                prompt.push_str("\n- ");
                prompt.push_str(line);
            }
        }
    }
    prompt.push_str("\nReply \"yes\" to go ahead or \"no\" to leave things as they are.");
    prompt
}

/// Re-prompt for a reply that matched neither the confirm nor the cancel
/// vocabulary.
pub fn confirmation_reprompt() -> String {
    "Just to be safe, I need a clear answer — reply \"yes\" to go ahead or \
     \"no\" to cancel."
        .to_owned()
}

/// Sent to the manager when a customer question is escalated to them.
pub fn manager_query_notification(customer_name: &str, customer_text: &str) -> String {
    format!(
        "Customer question from {customer_name}:\n\"{customer_text}\"\n\
         Reply to this message and I'll pass your answer on."
    )
}
