use std::sync::Arc;

use config::{AppConfig, ConfigStore};
use core_orchestrator::{
    Dispatcher, OperationSettings, ShellState, ThreadSpawner, missing_field_text, status_text,
};
use core_types::{
    DispatchError, Envelope, GatewayFactory, OperationKind, OperationRequest, RequiredField,
    UiLanguage,
};
use futures::StreamExt;
use gpui::{
    Context, Div, FocusHandle, InteractiveElement, IntoElement, KeyDownEvent, MouseButton,
    ParentElement, PathPromptOptions, PromptLevel, Render, Styled, Window, div, prelude::*, px,
    rgb,
};
use i18n::I18n;
use tracing::{error, warn};

use crate::text_field::{FieldId, KeyAction, TextFields, apply_key, insert_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Ask,
    Manage,
}

/// What the window needs from `main`.
pub struct AppDeps {
    pub config: AppConfig,
    pub config_store: ConfigStore,
    pub factory: Arc<dyn GatewayFactory>,
    pub settings: OperationSettings,
}

pub struct LecternApp {
    tab: Tab,
    i18n: I18n,
    config: AppConfig,
    config_store: ConfigStore,
    fields: TextFields,
    focused: Option<FieldId>,
    focus_handle: FocusHandle,
    allow_web: bool,
    shell: ShellState,
    dispatcher: Dispatcher,
}

impl LecternApp {
    pub fn new(deps: AppDeps, window: &mut Window, cx: &mut Context<Self>) -> Self {
        let focus_handle = cx.focus_handle();
        window.focus(&focus_handle);

        let session = deps.config.seed_session_from_env();
        let shell = ShellState::new(deps.settings.default_prefix.clone());
        let (dispatcher, mut receiver) =
            Dispatcher::new(deps.factory, deps.settings, Arc::new(ThreadSpawner));

        cx.spawn(async move |this, cx| {
            while let Some(envelope) = receiver.next().await {
                if this
                    .update(cx, |app, cx| app.on_envelope(envelope, cx))
                    .is_err()
                {
                    break;
                }
            }
        })
        .detach();

        Self {
            tab: Tab::Ask,
            i18n: I18n::new(deps.config.language),
            config: deps.config,
            config_store: deps.config_store,
            fields: TextFields::from_session(&session),
            focused: None,
            focus_handle,
            allow_web: false,
            shell,
            dispatcher,
        }
    }

    fn on_envelope(&mut self, envelope: Envelope, cx: &mut Context<Self>) {
        if self.dispatcher.accept(&envelope) {
            self.shell.apply(&envelope, &self.i18n);
            cx.notify();
        }
    }

    fn start(&mut self, kind: OperationKind, window: &mut Window, cx: &mut Context<Self>) {
        let session = self.fields.session();
        let request = match kind {
            OperationKind::Ask => {
                OperationRequest::ask(&session, self.fields.get(FieldId::Question), self.allow_web)
            }
            OperationKind::Validate => OperationRequest::validate(&session),
            OperationKind::Upload => OperationRequest::upload(&session, self.shell.files().to_vec()),
            OperationKind::Sync => OperationRequest::sync(&session),
        };

        match self.dispatcher.start(request.clone()) {
            Ok(_) => self.shell.begin(&request, &self.i18n),
            Err(DispatchError::MissingInput(field)) => self.prompt_missing(field, window, cx),
            Err(err) => warn!(kind = %kind, error = %err, "operation not started"),
        }
        cx.notify();
    }

    fn prompt_missing(&self, field: RequiredField, window: &mut Window, cx: &mut Context<Self>) {
        let title = self.i18n.t("notice.input_required").to_string();
        let detail = missing_field_text(field, &self.i18n);
        let ok = self.i18n.t("notice.ok").to_string();
        let _answer = window.prompt(
            PromptLevel::Warning,
            &title,
            Some(detail.as_str()),
            &[ok.as_str()],
            cx,
        );
    }

    fn pick_files(&mut self, cx: &mut Context<Self>) {
        let picked = cx.prompt_for_paths(PathPromptOptions {
            files: true,
            directories: false,
            multiple: true,
            prompt: None,
        });
        cx.spawn(async move |this, cx| {
            let paths = match picked.await {
                Ok(Ok(Some(paths))) => paths,
                Ok(Ok(None)) | Err(_) => return,
                Ok(Err(err)) => {
                    warn!(error = %err, "file picker failed");
                    return;
                }
            };
            let _ = this.update(cx, |app, cx| {
                app.shell.add_files(paths, &app.i18n);
                cx.notify();
            });
        })
        .detach();
    }

    fn toggle_language(&mut self, cx: &mut Context<Self>) {
        let next = match self.config.language {
            UiLanguage::KoKr => UiLanguage::EnUs,
            UiLanguage::EnUs => UiLanguage::KoKr,
        };
        self.config.language = next;
        self.i18n.set_language(next);
        if let Err(err) = self.config_store.save(&self.config) {
            error!("failed to save language: {err:#}");
        }
        cx.notify();
    }

    fn on_key(&mut self, event: &KeyDownEvent, cx: &mut Context<Self>) {
        let Some(field) = self.focused else {
            return;
        };
        let keystroke = &event.keystroke;
        let command = keystroke.modifiers.platform || keystroke.modifiers.control;
        let action = apply_key(
            self.fields.get_mut(field),
            field,
            &keystroke.key,
            keystroke.key_char.as_deref(),
            command,
        );
        match action {
            KeyAction::Edited => {}
            KeyAction::FocusNext => self.focused = Some(field.next()),
            KeyAction::Paste => {
                if let Some(text) = cx.read_from_clipboard().and_then(|item| item.text()) {
                    insert_text(self.fields.get_mut(field), field, &text);
                }
            }
            KeyAction::Ignored => return,
        }
        cx.notify();
    }

    fn render_field(&self, field: FieldId, cx: &mut Context<Self>) -> Div {
        let focused = self.focused == Some(field);
        let value = self.fields.get(field);
        let mut shown = value.to_string();
        if focused {
            shown.push('|');
        }

        let input = div()
            .id(field.element_id())
            .flex_1()
            .px_2()
            .py_1()
            .rounded_md()
            .bg(rgb(0x1e1e1e))
            .border_1()
            .border_color(if focused { rgb(0x3355aa) } else { rgb(0x3a3a3a) })
            .whitespace_normal()
            .on_mouse_down(
                MouseButton::Left,
                cx.listener(move |this, _event, window, cx| {
                    this.focused = Some(field);
                    window.focus(&this.focus_handle);
                    cx.notify();
                }),
            );
        let input = if field.multiline() {
            input.min_h(px(96.0))
        } else {
            input
        };
        let input = if value.is_empty() && !focused {
            let placeholder = match field {
                FieldId::Question => self.i18n.t("ask.placeholder"),
                FieldId::Region => self.i18n.t("config.region_default"),
                _ => "",
            };
            input
                .text_color(rgb(0x7a7a7a))
                .child(placeholder.to_string())
        } else {
            input.child(shown)
        };

        div()
            .flex()
            .gap_2()
            .items_center()
            .child(
                div()
                    .w(px(120.0))
                    .text_sm()
                    .child(self.i18n.t(field.label_key()).to_string()),
            )
            .child(input)
    }

    fn render_config(&self, cx: &mut Context<Self>) -> Div {
        let validate = self.action_button(
            "config.validate",
            OperationKind::Validate,
            cx,
        );
        div()
            .flex()
            .flex_col()
            .gap_2()
            .p_3()
            .rounded_md()
            .bg(rgb(0x181818))
            .child(div().text_base().child(self.i18n.t("config.title").to_string()))
            .child(self.render_field(FieldId::Region, cx))
            .child(self.render_field(FieldId::KnowledgeBase, cx))
            .child(self.render_field(FieldId::Bucket, cx))
            .child(self.render_field(FieldId::Prefix, cx))
            .child(div().flex().child(validate))
    }

    fn render_ask(&self, cx: &mut Context<Self>) -> Div {
        let check = if self.allow_web { "[x]" } else { "[ ]" };
        let answer = if self.shell.answer().is_empty() {
            div()
                .text_color(rgb(0x7a7a7a))
                .child(self.i18n.t("ask.answer_placeholder").to_string())
        } else {
            div().child(self.shell.answer().to_string())
        };

        div()
            .flex()
            .flex_col()
            .gap_2()
            .child(
                div()
                    .id("allow-web")
                    .text_sm()
                    .on_mouse_down(
                        MouseButton::Left,
                        cx.listener(|this, _event, _window, cx| {
                            this.allow_web = !this.allow_web;
                            cx.notify();
                        }),
                    )
                    .child(format!("{check} {}", self.i18n.t("ask.allow_web"))),
            )
            .child(self.render_field(FieldId::Question, cx))
            .child(
                div()
                    .flex()
                    .gap_2()
                    .child(self.action_button("ask.submit", OperationKind::Ask, cx))
                    .child(button(self.i18n.t("ask.clear"), true).on_mouse_down(
                        MouseButton::Left,
                        cx.listener(|this, _event, _window, cx| {
                            this.fields.get_mut(FieldId::Question).clear();
                            this.shell.clear_answer();
                            cx.notify();
                        }),
                    )),
            )
            .child(div().text_sm().child(self.i18n.t("ask.answer").to_string()))
            .child(
                div()
                    .id("answer")
                    .flex_1()
                    .min_h(px(180.0))
                    .overflow_y_scroll()
                    .p_2()
                    .rounded_md()
                    .bg(rgb(0x1e1e1e))
                    .whitespace_normal()
                    .child(answer),
            )
    }

    fn render_manage(&self, cx: &mut Context<Self>) -> Div {
        let files = if self.shell.files().is_empty() {
            div()
                .text_color(rgb(0x7a7a7a))
                .child(self.i18n.t("manage.files_empty").to_string())
        } else {
            self.shell.files().iter().fold(div().flex().flex_col(), |list, path| {
                list.child(path.display().to_string())
            })
        };
        let log = if self.shell.log().is_empty() {
            div()
                .text_color(rgb(0x7a7a7a))
                .child(self.i18n.t("manage.log_placeholder").to_string())
        } else {
            self.shell.log().iter().fold(div().flex().flex_col(), |list, line| {
                list.child(line.clone())
            })
        };

        div()
            .flex()
            .flex_col()
            .gap_2()
            .child(
                div()
                    .flex()
                    .gap_2()
                    .child(button(self.i18n.t("manage.add_files"), true).on_mouse_down(
                        MouseButton::Left,
                        cx.listener(|this, _event, _window, cx| this.pick_files(cx)),
                    ))
                    .child(button(self.i18n.t("manage.clear_files"), true).on_mouse_down(
                        MouseButton::Left,
                        cx.listener(|this, _event, _window, cx| {
                            this.shell.clear_files(&this.i18n);
                            cx.notify();
                        }),
                    )),
            )
            .child(
                div()
                    .id("files")
                    .max_h(px(140.0))
                    .overflow_y_scroll()
                    .p_2()
                    .rounded_md()
                    .bg(rgb(0x1e1e1e))
                    .text_sm()
                    .child(files),
            )
            .child(
                div()
                    .flex()
                    .gap_2()
                    .child(self.action_button("manage.upload", OperationKind::Upload, cx))
                    .child(self.action_button("manage.sync", OperationKind::Sync, cx)),
            )
            .child(div().text_sm().child(self.i18n.t("manage.log").to_string()))
            .child(
                div()
                    .id("log")
                    .flex_1()
                    .min_h(px(180.0))
                    .overflow_y_scroll()
                    .p_2()
                    .rounded_md()
                    .bg(rgb(0x1e1e1e))
                    .text_sm()
                    .whitespace_normal()
                    .child(log),
            )
    }

    /// A button that starts `kind`, disabled while that kind is running.
    fn action_button(&self, label_key: &str, kind: OperationKind, cx: &mut Context<Self>) -> Div {
        let enabled = !self.dispatcher.is_running(kind);
        let button = button(self.i18n.t(label_key), enabled);
        if enabled {
            button.on_mouse_down(
                MouseButton::Left,
                cx.listener(move |this, _event, window, cx| this.start(kind, window, cx)),
            )
        } else {
            button
        }
    }
}

impl Render for LecternApp {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let nav = div()
            .flex()
            .gap_2()
            .child(nav_item(self.i18n.t("nav.ask"), self.tab == Tab::Ask).on_mouse_down(
                MouseButton::Left,
                cx.listener(|this, _event, _window, cx| {
                    this.tab = Tab::Ask;
                    cx.notify();
                }),
            ))
            .child(
                nav_item(self.i18n.t("nav.manage"), self.tab == Tab::Manage).on_mouse_down(
                    MouseButton::Left,
                    cx.listener(|this, _event, _window, cx| {
                        this.tab = Tab::Manage;
                        cx.notify();
                    }),
                ),
            );

        let content = match self.tab {
            Tab::Ask => self.render_ask(cx).into_any_element(),
            Tab::Manage => self.render_manage(cx).into_any_element(),
        };

        div()
            .id("root")
            .track_focus(&self.focus_handle)
            .on_key_down(cx.listener(|this, event: &KeyDownEvent, _window, cx| {
                this.on_key(event, cx);
            }))
            .bg(rgb(0x121212))
            .text_color(rgb(0xeeeeee))
            .size_full()
            .flex()
            .flex_col()
            .p_4()
            .gap_3()
            .overflow_y_scroll()
            .child(
                div()
                    .flex()
                    .justify_between()
                    .items_center()
                    .child(div().text_xl().child(self.i18n.t("app.title").to_string()))
                    .child(button(self.i18n.t("lang.toggle"), true).on_mouse_down(
                        MouseButton::Left,
                        cx.listener(|this, _event, _window, cx| this.toggle_language(cx)),
                    )),
            )
            .child(self.render_config(cx))
            .child(nav)
            .child(content)
            .child(
                div()
                    .text_sm()
                    .text_color(rgb(0x9a9a9a))
                    .child(status_text(&self.dispatcher.running_kinds(), &self.i18n)),
            )
    }
}

fn nav_item(label: &str, selected: bool) -> Div {
    div()
        .bg(if selected {
            rgb(0x3355aa)
        } else {
            rgb(0x2d2d2d)
        })
        .text_color(rgb(0xffffff))
        .rounded_md()
        .px_3()
        .py_1()
        .child(label.to_string())
}

fn button(label: &str, enabled: bool) -> Div {
    div()
        .bg(if enabled { rgb(0x2d2d2d) } else { rgb(0x1a1a1a) })
        .text_color(if enabled { rgb(0xffffff) } else { rgb(0x6a6a6a) })
        .rounded_md()
        .px_3()
        .py_1()
        .child(label.to_string())
}
