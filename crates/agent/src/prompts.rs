//! Prompt templates. Placeholders are `{name}` and are replaced verbatim;
//! none of the templates are rendered through a template engine.

/// Persona for the interactive chat path.
pub const SYSTEM_INSTRUCTIONS: &str = "You are a friendly virtual assistant for a global \
relocation consultancy. You help visitors with questions about immigration, working overseas, \
studying overseas, and visa services. Keep answers concise and conversational. Over the course \
of the conversation, naturally ask for the visitor's name, email address, phone number with \
country code, age, nationality, current location, intended destination, highest qualification, \
work experience, profession, specialization, marital status, visa status, and how they heard \
about us. Never ask for more than one detail at a time.";

/// Structured extraction over the raw user inputs of one session.
/// Placeholder: `{input_query}`.
pub const EXTRACTION_PROMPT: &str = "Below are messages a visitor sent to a relocation \
consultancy assistant. Extract the visitor's details from them.

Messages:
{input_query}

Respond with ONLY a single line of comma-separated pairs in the form `Key: value`, using \
exactly these keys: Name, Age, Email, Country Code, Phone, Marital Status, Work Experience, \
Highest Qualification, Nationality, Visa Status, Current Location, Future Location, \
Specialization, Profession, Referral. Use `None` for any detail the visitor did not provide. \
Do not add any other text.";

/// Conversation summary for the CRM description field.
/// Placeholders: `{conversation_text}`, `{current_datetime}`, `{session_id}`.
pub const SUMMARIZATION_PROMPT: &str = "Summarize the following conversation between a visitor \
and a relocation consultancy assistant. Capture the visitor's goals, destination, timeline, and \
any concerns, in at most five sentences. Start the summary with `[{current_datetime}] \
(session {session_id})`.

Conversation:
{conversation_text}";

/// Follow-up question generation for the chat widget.
/// Placeholder: `{model_response}`.
pub const SUGGESTIONS_PROMPT: &str = "Based on the response: {model_response}

Suggest three follow-up questions that encourage detailed and engaging answers. The questions \
must be short, written from the perspective of the visitor speaking to the assistant, and stay \
within the space of immigration, working overseas, studying overseas, and visa services. Your \
response will consist of ONLY the three questions, separated by blank lines.";

/// System role for suggestion generation.
pub const SUGGESTIONS_SYSTEM: &str = "You create short, meaningful prompts from the perspective \
of a visitor talking to a relocation consultancy assistant. Do not number the prompts and do \
not put them in quotation marks.";

pub fn render(template: &str, replacements: &[(&str, &str)]) -> String {
    let mut output = template.to_string();
    for (name, value) in replacements {
        output = output.replace(&format!("{{{name}}}"), value);
    }
    output
}
