// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The weekly Alimtalk template catalog.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use shepherd_core::ShepherdError;
use shepherd_core::types::{Button, ButtonAction, MessageCategory};

use crate::render;

/// Local weekly send slot. `weekday` counts from Sunday (0) to Saturday (6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
}

/// A registered Alimtalk template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Generation id, e.g. `monday_summary`.
    pub id: String,
    /// Provider template code, e.g. `SERMON_SUMMARY_001`.
    pub code: String,
    pub name: String,
    pub title: String,
    /// Preference flag recipients must have set.
    pub category: MessageCategory,
    pub body: String,
    pub buttons: Vec<Button>,
    pub schedule: ScheduleSpec,
}

impl Template {
    /// Body with placeholders substituted.
    pub fn render(&self, vars: &BTreeMap<String, String>) -> String {
        render::render(&self.body, vars)
    }

    /// Buttons with placeholders substituted.
    pub fn render_buttons(&self, vars: &BTreeMap<String, String>) -> Vec<Button> {
        render::render_buttons(&self.buttons, vars)
    }

    /// Placeholder keys in the body or buttons that `vars` leaves unbound.
    pub fn missing_variables(&self, vars: &BTreeMap<String, String>) -> Vec<String> {
        let mut keys = render::placeholders(&self.body);
        for button in &self.buttons {
            let payload = match &button.action {
                ButtonAction::WebLink { url } => url,
                ButtonAction::Phone { phone_number } => phone_number,
                ButtonAction::Message { message_text } => message_text,
            };
            for key in render::placeholders(&button.text)
                .into_iter()
                .chain(render::placeholders(payload))
            {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys.retain(|key| !vars.contains_key(key));
        keys
    }
}

/// Immutable set of templates with unique ids and codes.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
}

impl TemplateCatalog {
    /// Reject duplicate ids or codes and out-of-range send slots.
    pub fn validate(&self) -> Result<(), ShepherdError> {
        let mut ids = HashSet::new();
        let mut codes = HashSet::new();
        for t in &self.templates {
            if !ids.insert(t.id.as_str()) {
                return Err(ShepherdError::Config(format!(
                    "duplicate template id `{}`",
                    t.id
                )));
            }
            if !codes.insert(t.code.as_str()) {
                return Err(ShepherdError::Config(format!(
                    "duplicate template code `{}`",
                    t.code
                )));
            }
            let s = t.schedule;
            if s.weekday > 6 || s.hour > 23 || s.minute > 59 {
                return Err(ShepherdError::Config(format!(
                    "template `{}` has an invalid schedule {}/{:02}:{:02}",
                    t.id, s.weekday, s.hour, s.minute
                )));
            }
        }
        Ok(())
    }

    /// The three weekly sermon follow-up templates.
    pub fn builtin() -> Self {
        Self {
            templates: builtin_templates(),
        }
    }

    /// Look up by generation id.
    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Look up by provider template code.
    pub fn by_code(&self, code: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.code == code)
    }

    /// Templates in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn web_link(id: &str, text: &str, url: &str) -> Button {
    Button {
        id: id.to_string(),
        text: text.to_string(),
        action: ButtonAction::WebLink {
            url: url.to_string(),
        },
    }
}

fn builtin_templates() -> Vec<Template> {
    vec![
        Template {
            id: "monday_summary".to_string(),
            code: "SERMON_SUMMARY_001".to_string(),
            name: "월요일 - 설교 요약 & 퀴즈".to_string(),
            title: "📖 이번 주 설교 요약".to_string(),
            category: MessageCategory::SermonSummary,
            body: "안녕하세요! {{church_name}} 교인 여러분 🙏

이번 주일 \"{{sermon_title}}\" 설교의 핵심 내용을 전해드립니다.

📖 본문: {{scripture}}

🔥 핵심 메시지:
{{summary}}

💡 오늘 하루를 시작하며, 이 말씀을 마음에 새기시길 바랍니다."
                .to_string(),
            buttons: vec![
                web_link(
                    "quiz_btn",
                    "📝 퀴즈 풀기",
                    "{{domain}}/ministry/{{sermon_id}}?tab=quiz",
                ),
                web_link(
                    "full_content_btn",
                    "📋 전체 내용 보기",
                    "{{domain}}/ministry/{{sermon_id}}",
                ),
            ],
            schedule: ScheduleSpec {
                weekday: 1,
                hour: 9,
                minute: 0,
            },
        },
        Template {
            id: "wednesday_meditation".to_string(),
            code: "MEDITATION_002".to_string(),
            name: "수요일 - 적용 질문 & 묵상".to_string(),
            title: "🙏 수요일 묵상".to_string(),
            category: MessageCategory::Meditation,
            body: "{{church_name}} 교인 여러분, 수요일입니다 ✨

일요일 \"{{sermon_title}}\" 말씀이 이번 주 어떻게 적용되고 계신가요?

🤔 묵상 질문:
{{meditation_questions}}

🙏 오늘 잠시 시간을 내어 하나님과 깊은 대화를 나누시길 바랍니다.

\"네 마음을 다하여 여호와를 의뢰하고 네 명철을 의지하지 말라\" (잠언 3:5)"
                .to_string(),
            buttons: vec![
                web_link(
                    "meditation_btn",
                    "🙏 묵상 내용 보기",
                    "{{domain}}/ministry/{{sermon_id}}?tab=meditation",
                ),
                Button {
                    id: "prayer_request_btn".to_string(),
                    text: "📞 기도 요청하기".to_string(),
                    action: ButtonAction::Phone {
                        phone_number: "{{pastor_phone}}".to_string(),
                    },
                },
            ],
            schedule: ScheduleSpec {
                weekday: 3,
                hour: 9,
                minute: 0,
            },
        },
        Template {
            id: "friday_practice".to_string(),
            code: "PRACTICE_CHECK_003".to_string(),
            name: "금요일 - 실천과제 점검 & 격려".to_string(),
            title: "💪 금요일 실천 점검".to_string(),
            category: MessageCategory::PracticeCheck,
            body: "{{church_name}} 교인 여러분, 한 주간 수고 많으셨습니다 👏

\"{{sermon_title}}\" 말씀으로 시작한 이번 주가 어떠셨나요?

✅ 실천 점검:
{{practical_tasks}}

🌟 작은 실천이라도 괜찮습니다. 하나님께서 여러분의 마음을 아시고 기뻐하실 것입니다.

\"그런즉 내 사랑하는 형제들아 견고하며 흔들리지 말고 항상 주의 일에 더욱 힘쓰는 자들이 되라\" (고전 15:58)

🙏 주일에 뵙겠습니다!"
                .to_string(),
            buttons: vec![
                Button {
                    id: "testimony_btn".to_string(),
                    text: "💌 은혜 나누기".to_string(),
                    action: ButtonAction::Message {
                        message_text: "이번 주 말씀을 통해 받은 은혜를 나눠주세요!".to_string(),
                    },
                },
                web_link(
                    "sunday_preview_btn",
                    "📅 주일 예배 안내",
                    "{{domain}}/sunday-info",
                ),
            ],
            schedule: ScheduleSpec {
                weekday: 5,
                hour: 9,
                minute: 0,
            },
        },
    ]
}
