use crate::store::UserProfile;
use crate::types::Mood;

const PERSONA: &str = "Eres Comadre, una compañera virtual que conversa por voz con una persona mayor. \
Tu tono es siempre cálido, empático y paciente, como el de una amiga de toda la vida.";

const RULES: &str = "REGLAS DE ORO:
- FRASES CORTAS: responde en una o dos oraciones, es una conversación hablada.
- CERCANÍA: usa expresiones como '¡Qué bonito!', 'Fíjate que...', 'Me da mucho gusto'.
- INTERÉS: haz preguntas de seguimiento sencillas para mantener la plática.";

/// Compose the system instruction for one turn.
///
/// The fixed persona and rules come first, followed by one line per
/// non-empty profile fact in a fixed order: name, family, interests,
/// recent mood, pending question.
pub fn build(profile: &UserProfile) -> String {
    let mut prompt = format!("{PERSONA}\n\n{RULES}");
    for clause in personalization(profile) {
        prompt.push_str("\n- ");
        prompt.push_str(&clause);
    }
    prompt
}

fn personalization(profile: &UserProfile) -> Vec<String> {
    let mut clauses = Vec::new();

    if let Some(name) = profile.user_name.as_deref() {
        clauses.push(format!(
            "NOMBRE: la persona con la que hablas se llama {name}. Llámala por su nombre de vez en cuando."
        ));
    }

    if !profile.family_mentioned.is_empty() {
        let family: Vec<&str> = profile.family_mentioned.iter().map(String::as_str).collect();
        clauses.push(format!(
            "FAMILIA: te ha hablado de su {}. Puedes preguntarle por ellos.",
            join_spoken(&family)
        ));
    }

    if !profile.interests.is_empty() {
        let interests: Vec<&str> = profile.interests.iter().map(String::as_str).collect();
        clauses.push(format!(
            "INTERESES: le gusta {}. Usa estos temas para animar la plática.",
            join_spoken(&interests)
        ));
    }

    match profile.recent_mood() {
        Mood::Sad => clauses.push(
            "CONTEXTO EMOCIONAL: su último estado de ánimo fue triste. Sé extra reconfortante y paciente."
                .to_string(),
        ),
        Mood::Happy => clauses.push(
            "CONTEXTO EMOCIONAL: su último estado de ánimo fue alegre. Comparte su alegría y mantén la plática positiva."
                .to_string(),
        ),
        Mood::Neutral => {}
    }

    if let Some(question) = profile.last_question_asked.as_deref() {
        clauses.push(format!(
            "CONTINUIDAD: acabas de preguntar '{question}'. Su respuesta probablemente se relacione con eso."
        ));
    }

    clauses
}

/// "a", "a y b", "a, b y c".
fn join_spoken(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} y {last}", init.join(", ")),
    }
}
