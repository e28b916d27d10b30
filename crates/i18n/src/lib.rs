use std::collections::BTreeMap;

use core_types::UiLanguage;

#[derive(Debug, Clone)]
pub struct I18n {
    lang: UiLanguage,
    ko_kr: BTreeMap<&'static str, &'static str>,
    en_us: BTreeMap<&'static str, &'static str>,
}

impl I18n {
    pub fn new(lang: UiLanguage) -> Self {
        Self {
            lang,
            ko_kr: ko_kr_map(),
            en_us: en_us_map(),
        }
    }

    pub fn set_language(&mut self, lang: UiLanguage) {
        self.lang = lang;
    }

    pub fn language(&self) -> UiLanguage {
        self.lang
    }

    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        match self.lang {
            UiLanguage::KoKr => self
                .ko_kr
                .get(key)
                .copied()
                .or_else(|| self.en_us.get(key).copied())
                .unwrap_or(key),
            UiLanguage::EnUs => self
                .en_us
                .get(key)
                .copied()
                .or_else(|| self.ko_kr.get(key).copied())
                .unwrap_or(key),
        }
    }

    /// Looks up `key` and substitutes each `{name}` placeholder.
    pub fn tf(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut text = self.t(key).to_string();
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }
}

fn ko_kr_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("app.title", "Lectern 학습 도우미"),
        ("nav.ask", "질문하기"),
        ("nav.manage", "문서 관리"),
        ("lang.toggle", "English"),
        ("config.title", "환경 설정"),
        ("config.region", "AWS 리전"),
        ("config.kb", "지식 기반 ID"),
        ("config.bucket", "S3 버킷"),
        ("config.prefix", "S3 접두사"),
        ("config.validate", "KB 점검"),
        ("config.region_default", "(기본)"),
        ("ask.allow_web", "웹 보조 허용 (http_request)"),
        (
            "ask.placeholder",
            "교재나 강의 자료에 대해 질문하세요. 예) '2장 프로세스 관리의 핵심 개념을 요약해줘'",
        ),
        ("ask.submit", "질문하기"),
        ("ask.clear", "지우기"),
        ("ask.question", "질문"),
        ("ask.answer", "응답"),
        (
            "ask.answer_placeholder",
            "응답이 여기에 표시됩니다 (근거: 파일/섹션/페이지 포함).",
        ),
        ("ask.thinking", "생각 중... (KB 검색 중)"),
        ("manage.add_files", "PDF 파일 추가"),
        ("manage.clear_files", "목록 비우기"),
        ("manage.upload", "선택 파일 업로드 (S3)"),
        ("manage.sync", "KB 동기화 시작"),
        ("manage.files_empty", "선택된 파일이 없습니다."),
        ("manage.log", "로그"),
        (
            "manage.log_placeholder",
            "업로드, 동기화, 점검 로그가 여기에 표시됩니다.",
        ),
        ("notice.input_required", "입력 필요"),
        ("notice.ok", "확인"),
        ("missing.knowledge_base_id", "지식 기반 ID를 입력하세요."),
        ("missing.question", "질문을 입력하세요."),
        ("missing.bucket", "S3 버킷을 입력하세요."),
        ("missing.files", "업로드할 PDF 파일을 추가하세요."),
        ("log.validate_start", "[점검] KB={kb}, 리전={region}"),
        ("log.selected", "[선택] {count}개 파일 추가"),
        ("log.skipped", "[선택] PDF가 아닌 파일 {count}개 제외"),
        ("log.cleared", "[선택] 목록 비움"),
        ("log.upload_start", "[업로드 시작] {count}개 파일 → s3://{bucket}/{prefix}"),
        ("log.upload_file", "[업로드] {path} ..."),
        ("log.upload_done", "[완료] {uri}"),
        ("log.upload_summary", "[업로드 완료] 총 {count}개 업로드 완료"),
        ("log.sync_start", "[동기화 요청] KB={kb}"),
        (
            "log.sync_accepted",
            "[동기화] 동기화 작업 {count}건 시작 요청 완료 (완료까지 수 분 소요)",
        ),
        ("report.kb_status", "[KB] ID={id}, 상태={status}"),
        ("report.ds_none", "[KB] 데이터 소스: 없음 (S3 데이터 소스 추가 필요)"),
        ("report.ds_count", "[KB] 데이터 소스: {count}개"),
        ("fail.validate", "[KB 점검 실패]"),
        ("fail.ask", "[질문 처리 오류]"),
        ("fail.upload", "[업로드 실패]"),
        ("fail.sync", "[동기화 실패]"),
        ("status.idle", "대기 중"),
        ("status.running", "실행 중: {kinds}"),
        ("kind.ask", "질문"),
        ("kind.validate", "점검"),
        ("kind.upload", "업로드"),
        ("kind.sync", "동기화"),
    ])
}

fn en_us_map() -> BTreeMap<&'static str, &'static str> {
    BTreeMap::from([
        ("app.title", "Lectern Study Assistant"),
        ("nav.ask", "Ask"),
        ("nav.manage", "Documents"),
        ("lang.toggle", "한국어"),
        ("config.title", "Environment"),
        ("config.region", "AWS Region"),
        ("config.kb", "Knowledge Base ID"),
        ("config.bucket", "S3 Bucket"),
        ("config.prefix", "S3 Prefix"),
        ("config.validate", "Check KB"),
        ("config.region_default", "(default)"),
        ("ask.allow_web", "Allow web assist (http_request)"),
        (
            "ask.placeholder",
            "Ask about your course material, e.g. 'Summarize the key ideas of chapter 2'",
        ),
        ("ask.submit", "Ask"),
        ("ask.clear", "Clear"),
        ("ask.question", "Question"),
        ("ask.answer", "Answer"),
        (
            "ask.answer_placeholder",
            "The answer appears here, with sources (file/section/page).",
        ),
        ("ask.thinking", "Thinking... (searching the knowledge base)"),
        ("manage.add_files", "Add PDF files"),
        ("manage.clear_files", "Clear list"),
        ("manage.upload", "Upload selected (S3)"),
        ("manage.sync", "Start KB sync"),
        ("manage.files_empty", "No files selected."),
        ("manage.log", "Log"),
        (
            "manage.log_placeholder",
            "Upload, sync and check messages appear here.",
        ),
        ("notice.input_required", "Input required"),
        ("notice.ok", "OK"),
        ("missing.knowledge_base_id", "Enter a knowledge base ID."),
        ("missing.question", "Enter a question."),
        ("missing.bucket", "Enter an S3 bucket."),
        ("missing.files", "Add PDF files to upload."),
        ("log.validate_start", "[Check] KB={kb}, Region={region}"),
        ("log.selected", "[Select] added {count} file(s)"),
        ("log.skipped", "[Select] skipped {count} non-PDF file(s)"),
        ("log.cleared", "[Select] list cleared"),
        (
            "log.upload_start",
            "[Upload start] {count} file(s) -> s3://{bucket}/{prefix}",
        ),
        ("log.upload_file", "[Upload] {path} ..."),
        ("log.upload_done", "[Done] {uri}"),
        ("log.upload_summary", "[Upload complete] {count} file(s) uploaded"),
        ("log.sync_start", "[Sync request] KB={kb}"),
        (
            "log.sync_accepted",
            "[Sync] requested {count} ingestion job(s); completion may take several minutes",
        ),
        ("report.kb_status", "[KB] ID={id}, status={status}"),
        (
            "report.ds_none",
            "[KB] Data sources: none (add an S3 data source)",
        ),
        ("report.ds_count", "[KB] Data sources: {count}"),
        ("fail.validate", "[KB check failed]"),
        ("fail.ask", "[Question failed]"),
        ("fail.upload", "[Upload failed]"),
        ("fail.sync", "[Sync failed]"),
        ("status.idle", "Idle"),
        ("status.running", "Running: {kinds}"),
        ("kind.ask", "ask"),
        ("kind.validate", "check"),
        ("kind.upload", "upload"),
        ("kind.sync", "sync"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_korean_translation() {
        let i18n = I18n::new(UiLanguage::KoKr);
        assert_eq!(i18n.t("nav.ask"), "질문하기");
    }

    #[test]
    fn falls_back_to_key_when_missing() {
        let i18n = I18n::new(UiLanguage::EnUs);
        assert_eq!(i18n.t("not.exists"), "not.exists");
    }

    #[test]
    fn substitutes_named_placeholders() {
        let i18n = I18n::new(UiLanguage::EnUs);
        assert_eq!(
            i18n.tf("report.kb_status", &[("id", "KB1"), ("status", "ACTIVE")]),
            "[KB] ID=KB1, status=ACTIVE"
        );
    }

    #[test]
    fn both_catalogs_cover_the_same_keys() {
        let ko: Vec<_> = ko_kr_map().into_keys().collect();
        let en: Vec<_> = en_us_map().into_keys().collect();
        assert_eq!(ko, en);
    }
}
