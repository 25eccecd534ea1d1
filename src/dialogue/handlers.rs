use tracing::{debug, info};

use crate::agent::{Completer, EmpathyFilter, prompt};
use crate::config::DialogueConfig;
use crate::extract;
use crate::mood;
use crate::phrases::{PhrasePicker, choose};
use crate::store::UserProfile;
use crate::types::{Mood, Reply, preview};

pub const ASK_NAME: &str = "¿Cómo te llamas?";

/// The outermost fallback, spoken when a turn faults.
pub const DISTRACTED: &str =
    "Ay, perdóname, creo que me distraje un momento y no te entendí. ¿Me lo podrías repetir, por favor?";

/// Used in place of a name we haven't learned yet.
const NAME_PLACEHOLDER: &str = "querida";

/// What happens to the working profile after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Save,
    Clear,
    Discard,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub reply: Reply,
    pub effect: Effect,
}

impl Outcome {
    fn save(reply: Reply) -> Self {
        Self {
            reply,
            effect: Effect::Save,
        }
    }

    fn discard(reply: Reply) -> Self {
        Self {
            reply,
            effect: Effect::Discard,
        }
    }
}

/// Collaborators a handler may use. Borrowed from the turn handler.
pub struct Context<'a> {
    pub completer: &'a dyn Completer,
    pub empathy: &'a EmpathyFilter,
    pub picker: &'a dyn PhrasePicker,
    pub dialogue: &'a DialogueConfig,
    pub retain_identity_on_clear: bool,
}

pub fn launch(profile: &mut UserProfile) -> Outcome {
    let Some(name) = profile.user_name.clone() else {
        profile.last_question_asked = Some(ASK_NAME.to_string());
        return Outcome::save(Reply::ask(
            "¡Hola! Soy Comadre, tu compañera virtual. Me encantaría que platicáramos. Para conocerte mejor, ¿cómo te llamas?",
            "¿Cómo te gustaría que te llame?",
        ));
    };

    let (speech, question) = match profile.recent_mood() {
        Mood::Sad => (
            format!(
                "¡Hola de nuevo, {name}! La última vez te noté un poquito triste y me quedé pensando en ti. ¿Cómo te sientes hoy?"
            ),
            "¿Cómo te sientes hoy?",
        ),
        Mood::Happy => (
            format!(
                "¡{name}, qué gusto escucharte! La última vez te oí de tan buen ánimo. ¿Qué cosas bonitas me cuentas hoy?"
            ),
            "¿Qué cosas bonitas me cuentas hoy?",
        ),
        Mood::Neutral => (
            format!(
                "¡Qué alegría escucharte de nuevo, {name}! Me da mucho gusto platicar contigo. ¿Cómo has estado?"
            ),
            "¿Cómo has estado?",
        ),
    };

    profile.last_question_asked = Some(question.to_string());
    Outcome::save(Reply::ask(speech, "¿Qué me cuentas de nuevo?"))
}

pub fn provide_name(profile: &mut UserProfile, utterance: Option<&str>) -> Outcome {
    let name = utterance.and_then(|text| {
        extract::extract_into(text, profile)
            .name
            .or_else(|| extract::bare_name(text))
    });

    match name {
        Some(name) => {
            profile.user_name = Some(name.clone());
            Outcome::save(welcome(profile, &name))
        }
        None => {
            profile.last_question_asked = Some("¿Cómo te sientes hoy?".to_string());
            Outcome::save(Reply::ask(
                "No entendí bien tu nombre, pero no te preocupes. Me da gusto conocerte. ¿Cómo te sientes hoy?",
                "Cuéntame cómo estás.",
            ))
        }
    }
}

pub fn positive_response(profile: &mut UserProfile, ctx: &Context<'_>) -> Outcome {
    let name = display_name(profile);
    let options = [
        format!(
            "¡Qué alegría me da escuchar eso, {name}! Me contagias tu buen humor. ¿A qué se debe esa felicidad?"
        ),
        "¡Me encanta que estés bien! Cuéntame algo bonito que te haya pasado hoy.".to_string(),
    ];
    let speech = choose(ctx.picker, &options).cloned().unwrap_or_default();

    profile.record_mood(Mood::Happy);
    profile.push_exchange("Me siento bien.", speech.clone());
    profile.last_question_asked = Some(
        last_question(&speech).unwrap_or_else(|| "¿Qué te hizo sentir tan bien?".to_string()),
    );

    Outcome::save(Reply::ask(speech, "¿Qué me cuentas?"))
}

pub fn negative_response(profile: &mut UserProfile, ctx: &Context<'_>) -> Outcome {
    let name = display_name(profile);
    let options = [
        format!(
            "Ay, {name}, lamento escuchar eso. Recuerda que no estás sola, aquí estoy para escucharte. ¿Quieres contarme qué pasó?"
        ),
        "Me da mucha pena que te sientas así. A veces platicar un poquito ayuda a sacar lo que uno trae dentro. ¿Qué te tiene con el ánimo bajo?".to_string(),
    ];
    let speech = choose(ctx.picker, &options).cloned().unwrap_or_default();

    profile.record_mood(Mood::Sad);
    profile.push_exchange("Me siento mal.", speech.clone());
    profile.last_question_asked = Some(
        last_question(&speech).unwrap_or_else(|| "¿Qué te tiene triste?".to_string()),
    );

    Outcome::save(Reply::ask(speech, "¿Qué sucede?"))
}

/// The main pipeline: classify, extract, prompt, complete, soften, record.
pub async fn conversation(
    profile: &mut UserProfile,
    utterance: Option<&str>,
    ctx: &Context<'_>,
) -> Outcome {
    let utterance = utterance
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(ctx.dialogue.default_utterance.as_str());

    let awaiting_name = profile.user_name.is_none();
    let mood = mood::classify(utterance);
    debug!(utterance = %preview(utterance, 30), %mood, "classified utterance");
    profile.record_mood(mood);

    let found = extract::extract_into(utterance, profile);
    if awaiting_name {
        if let Some(name) = found.name {
            let reply = welcome(profile, &name);
            profile.push_exchange(utterance, reply.speech.clone());
            return Outcome::save(reply);
        }
    }

    let system_prompt = prompt::build(profile);
    let completion = ctx
        .completer
        .complete(&profile.conversation_history, utterance, &system_prompt)
        .await;
    let speech = ctx.empathy.apply(&completion, mood);

    profile.push_exchange(utterance, speech.clone());
    match last_question(&speech) {
        Some(question) => profile.last_question_asked = Some(question),
        None if ctx.dialogue.clear_last_question => profile.last_question_asked = None,
        None => {}
    }

    Outcome::save(Reply::ask(speech, "¿Qué más me quieres contar?"))
}

/// Answer to an explicit "forget me" request. The store does the wiping.
pub fn clear_memory(profile: &UserProfile, ctx: &Context<'_>) -> Outcome {
    let speech = match profile.user_name.as_deref() {
        Some(name) if ctx.retain_identity_on_clear => Reply::ask(
            format!(
                "Listo, {name}. Borré nuestras pláticas, pero sigo recordando quién eres. ¿De qué te gustaría platicar?"
            ),
            "¿Qué me cuentas?",
        ),
        _ => Reply::ask(
            "Listo. Empecemos de cero. ¡Será un gusto conocerte de nuevo! Para empezar, ¿cómo te llamas?",
            "¿Cómo te gustaría que te llame?",
        ),
    };

    Outcome {
        reply: speech,
        effect: Effect::Clear,
    }
}

pub fn help() -> Outcome {
    Outcome::discard(Reply::ask(
        "¡Claro que sí! Soy tu amiga Comadre. Puedes contarme lo que sea: cómo te sientes, qué hiciste en el día, \
         o simplemente podemos platicar de lo que tú quieras. Siempre estoy aquí para escucharte. \
         Entonces, ¿qué me quieres contar?",
        "¿De qué te gustaría hablar?",
    ))
}

pub fn stop(profile: &UserProfile, ctx: &Context<'_>) -> Outcome {
    let name = display_name(profile);
    let farewells = [
        format!(
            "Claro que sí, {name}. Que tengas un día muy bonito. Aquí te espero cuando quieras volver a platicar."
        ),
        format!("Me encantó nuestra plática, {name}. Cuídate mucho. ¡Hasta pronto!"),
    ];
    let speech = choose(ctx.picker, &farewells).cloned().unwrap_or_default();
    Outcome::discard(Reply::tell(speech))
}

pub fn session_ended(reason: Option<&str>) -> Outcome {
    info!(reason = reason.unwrap_or("unspecified"), "session ended");
    Outcome::discard(Reply::tell(""))
}

pub fn distracted() -> Reply {
    Reply::ask(DISTRACTED, DISTRACTED)
}

fn welcome(profile: &mut UserProfile, name: &str) -> Reply {
    profile.last_question_asked = Some("¿Cómo te ha ido hoy?".to_string());
    Reply::ask(
        format!(
            "¡Qué bonito nombre, {name}! Es un gusto conocerte. Ahora sí, cuéntame, ¿cómo te ha ido hoy?"
        ),
        "¿Qué me quieres contar?",
    )
}

fn display_name(profile: &UserProfile) -> String {
    profile
        .user_name
        .clone()
        .unwrap_or_else(|| NAME_PLACEHOLDER.to_string())
}

/// The last question sentence in a reply, from its `¿` (or the previous
/// sentence break) through the closing `?`. A `¿` before that break opens
/// an earlier sentence and is ignored.
pub fn last_question(text: &str) -> Option<String> {
    let end = text.rfind('?')?;
    let head = &text[..end];
    let after_break = head
        .rfind(['.', '!', '?'])
        .map(|pos| pos + 1)
        .unwrap_or(0);
    let start = match head.rfind('¿') {
        Some(open) if open >= after_break => open,
        _ => after_break,
    };
    let question = text[start..=end].trim();
    (!question.is_empty()).then(|| question.to_string())
}
