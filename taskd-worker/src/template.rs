//! Handlebars-based compilation of a task template against a task's
//! request fields, producing the YAML (or arbitrary text) document a
//! backend adapter ultimately submits.
//!
//! Four helpers are registered beyond handlebars' stock set, mirroring
//! the template functions the original runtime exposed:
//!
//! - `replaceNewline value indent`: turns a multi-line string into a YAML
//!   block scalar (`"|\n"` prefix, each `\n` re-indented).
//! - `yamlQuote value`: quotes a value for safe embedding in YAML,
//!   rendering missing/null as an empty quoted string.
//! - `yamlValue value default`: substitutes `default` for missing/null.
//! - `hasKey map key`: presence test against a JSON object.

use crate::error::TemplateError;
use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext};
use serde_json::Value as JsonValue;
use taskd_shared::models::{TaskRec, TaskTemplate};
use taskd_shared::phase::TimeoutSetting;

fn replace_newline_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).map(|p| p.value()).unwrap_or(&JsonValue::Null);
    let indent = h.param(1).and_then(|p| p.value().as_u64()).unwrap_or(0) as usize;
    let text = json_display(value);
    if text.contains('\n') {
        let pad = " ".repeat(indent);
        let reindented = text.replace('\n', &format!("\n{}", pad));
        out.write("|\n")?;
        out.write(&reindented)?;
    } else {
        out.write(&text)?;
    }
    Ok(())
}

fn yaml_quote_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).map(|p| p.value());
    match value {
        None | Some(JsonValue::Null) => out.write("\"\"")?,
        Some(v) => out.write(&format!("{:?}", json_display(v)))?,
    }
    Ok(())
}

fn yaml_value_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).map(|p| p.value());
    let default = h.param(1).map(|p| p.value()).cloned().unwrap_or(JsonValue::Null);
    match value {
        None | Some(JsonValue::Null) => out.write(&json_display(&default))?,
        Some(v) => out.write(&json_display(v))?,
    }
    Ok(())
}

fn has_key_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let map = h.param(0).map(|p| p.value());
    let key = h.param(1).and_then(|p| p.value().as_str()).unwrap_or("");
    let has = !key.is_empty() && matches!(map, Some(JsonValue::Object(obj)) if obj.contains_key(key));
    out.write(if has { "true" } else { "false" })?;
    Ok(())
}

fn json_display(v: &JsonValue) -> String {
    match v {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn engine() -> Handlebars<'static> {
    let mut hb = Handlebars::new();
    hb.register_helper("replaceNewline", Box::new(replace_newline_helper));
    hb.register_helper("yamlQuote", Box::new(yaml_quote_helper));
    hb.register_helper("yamlValue", Box::new(yaml_value_helper));
    hb.register_helper("hasKey", Box::new(has_key_helper));
    hb
}

/// Merges template-level `extra` defaults with the instance's own
/// `extra`, the instance winning on key collisions.
pub fn merge_extra(template: &TaskTemplate, rec: &TaskRec) -> JsonValue {
    let mut base: JsonValue = serde_json::from_str(&template.extra).unwrap_or(JsonValue::Object(Default::default()));
    if let (Some(base_obj), JsonValue::Object(override_obj)) = (base.as_object_mut(), &rec.obj.extra) {
        for (k, v) in override_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

/// Compiles `template.schema` against `rec`, binding `_task`, `_extra`,
/// and `_tags` alongside the instance's own `args` object at the render
/// root. An empty schema compiles to an empty document — not every
/// engine kind needs a rendered manifest.
pub fn compile(template: &TaskTemplate, rec: &TaskRec) -> Result<String, TemplateError> {
    if template.schema.is_empty() {
        return Ok(String::new());
    }

    let mut root = match &rec.obj.args {
        JsonValue::Object(map) => JsonValue::Object(map.clone()),
        _ => JsonValue::Object(Default::default()),
    };
    let root_obj = root.as_object_mut().expect("constructed as object above");
    root_obj.insert("_task".to_string(), serde_json::to_value(rec).unwrap_or(JsonValue::Null));
    root_obj.insert("_extra".to_string(), merge_extra(template, rec));
    root_obj.insert(
        "_tags".to_string(),
        serde_json::to_value(&rec.obj.tags).unwrap_or(JsonValue::Object(Default::default())),
    );

    let hb = engine();
    hb.render_template(&template.schema, &root)
        .map_err(|e| TemplateError::Render(e.to_string()))
}

/// Resolves the effective per-phase timeout for a task: the instance's
/// own `timeout` overrides, layered on top of the process-wide default.
pub fn resolve_timeout(rec: &TaskRec, default: &taskd_shared::phase::Timeout) -> taskd_shared::phase::Timeout {
    let setting: &TimeoutSetting = &rec.obj.timeout;
    setting.resolve(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskd_shared::models::task_rec::TaskObjRec;

    fn sample_rec(args: JsonValue) -> TaskRec {
        TaskRec::new(TaskObjRec {
            uuid: "u-1".into(),
            parent: None,
            namespace: String::new(),
            name: "demo".into(),
            project: String::new(),
            template: "tpl".into(),
            pool: "default".into(),
            extra: JsonValue::Null,
            args,
            timeout: Default::default(),
            quotas: vec![],
            tags: Default::default(),
            callback: String::new(),
            created_by: "alice".into(),
        })
    }

    fn sample_template(schema: &str) -> TaskTemplate {
        TaskTemplate {
            name: "tpl".into(),
            title: "Demo".into(),
            engine: "mock".into(),
            schema: schema.into(),
            extra: "{}".into(),
            create_time: chrono::Utc::now(),
        }
    }

    #[test]
    fn empty_schema_compiles_to_empty_string() {
        let rec = sample_rec(JsonValue::Null);
        let template = sample_template("");
        assert_eq!(compile(&template, &rec).unwrap(), "");
    }

    #[test]
    fn binds_args_at_root_and_task_under_underscore_task() {
        let rec = sample_rec(serde_json::json!({"command": "echo hi"}));
        let template = sample_template("cmd: {{command}}\nname: {{_task.name}}");
        let rendered = compile(&template, &rec).unwrap();
        assert!(rendered.contains("cmd: echo hi"));
        assert!(rendered.contains("name: demo"));
    }

    #[test]
    fn has_key_helper_detects_presence() {
        let rec = sample_rec(serde_json::json!({"present": 1}));
        let template = sample_template("{{#if (hasKey this \"present\")}}yes{{else}}no{{/if}}");
        assert_eq!(compile(&template, &rec).unwrap(), "yes");
    }

    #[test]
    fn yaml_value_falls_back_to_default_for_missing() {
        let rec = sample_rec(JsonValue::Null);
        let template = sample_template("{{yamlValue missing \"fallback\"}}");
        assert_eq!(compile(&template, &rec).unwrap(), "fallback");
    }
}
