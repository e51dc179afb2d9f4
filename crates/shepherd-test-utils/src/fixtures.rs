// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sample domain values.

use chrono::{DateTime, NaiveDate, Utc};
use shepherd_core::types::{Member, NewQueueItem, ProcessedSermon};

/// A sermon preached on Sunday 2025-01-05.
pub fn sermon() -> ProcessedSermon {
    ProcessedSermon {
        id: "sermon-2025-01-05".to_string(),
        title: "믿음의 첫걸음".to_string(),
        scripture: "히브리서 11:1-6".to_string(),
        date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap_or_default(),
        summary: "믿음은 바라는 것들의 실상이요 보지 못하는 것들의 증거입니다.".to_string(),
        meditation: "오늘 나의 믿음은 어디에 뿌리내리고 있나요?\n\
                     하나님의 약속을 묵상해 봅시다.\n\
                     감사 제목을 적어 보세요."
            .to_string(),
        practical_tasks: vec![
            "매일 아침 10분 말씀 읽기".to_string(),
            "한 사람에게 격려의 말 전하기".to_string(),
            "감사 일기 쓰기".to_string(),
            "주일 예배 미리 준비하기".to_string(),
        ],
    }
}

/// An active member opted in to every category.
pub fn member(id: &str, phone: &str) -> Member {
    Member {
        id: id.to_string(),
        name: format!("성도 {id}"),
        phone: phone.to_string(),
        is_active: true,
        message_settings: Default::default(),
    }
}

/// An Alimtalk item for a built-in template, due at `at`.
pub fn queue_item(template_code: &str, phone: &str, at: DateTime<Utc>) -> NewQueueItem {
    NewQueueItem::alimtalk(template_code, phone, "테스트 메시지", at)
}
