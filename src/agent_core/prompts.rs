//! System instruction and the fixed user-facing strings of a run.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::agent_core::types::AiMode;

/// Shown when the model returned neither text nor function calls.
pub const FALLBACK_TEXT: &str =
    "Не удалось получить ответ от ассистента. Попробуйте переформулировать запрос.";

/// Shown when the iteration budget ran out before a text answer.
pub const MAX_ITERATIONS_TEXT: &str =
    "Достигнуто максимальное количество шагов. Уточните запрос или продолжите в новом сообщении.";

/// Placeholder text of a tool-call indicator in the transcript.
pub fn thinking_placeholder(tool: &str) -> String {
    format!("Выполняю {tool}…")
}

/// Identity: static portion of the instruction.
const INSTRUCTION_INTRO: &str = "\
Ты — ИИ-ассистент системы управления библиотекой. Ты помогаешь сотрудникам \
находить книги, экземпляры, читателей, бронирования и полки, а также \
выполнять действия через доступные инструменты.";

/// Build the system instruction sent with every request of a run.
///
/// The current UTC time lets the model resolve relative dates ("завтра",
/// "на прошлой неделе") in reservation queries.
pub fn system_instruction(now: DateTime<Utc>, mode: AiMode, max_tool_uses: u32) -> String {
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mode_rule = match mode {
        AiMode::Question => {
            "Сейчас включён режим вопросов: доступны только инструменты чтения. \
             Если пользователь просит изменить данные, объясни, что для этого \
             нужно переключиться в режим действий."
        }
        AiMode::Action => {
            "Сейчас включён режим действий: можно изменять данные через инструменты."
        }
    };

    format!(
        "{INSTRUCTION_INTRO}\n\n\
Текущее время (UTC): {timestamp}\n\n\
{mode_rule}\n\n\
Правила:\n\
1. Не спрашивай подтверждения. Если запрос понятен, сразу вызывай нужный инструмент.\n\
2. Отвечай обычным текстом, без Markdown-разметки.\n\
3. Не останавливайся на середине задачи: доведи её до конца и только потом дай итоговый ответ.\n\
4. Используй не более {max_tool_uses} вызовов инструментов на один запрос.\n\
5. Сообщай только те данные, которые действительно получил от инструментов.\n\
6. Если инструмент вернул ошибку, кратко объясни её пользователю."
    )
}
