//! Template rewriter for files too damaged to patch.
//!
//! A file's role is derived from its path (Next.js-style `app/api/**/route.ts`
//! endpoints), and a known-good template for that role replaces the file
//! wholesale. Placeholders are filled from the path:
//!
//! | placeholder | `app/api/care-plans/[planId]/route.ts` |
//! |---|---|
//! | `{{name}}`  | `care-plans` |
//! | `{{Name}}`  | `CarePlans` |
//! | `{{camel}}` | `carePlans` |
//! | `{{label}}` | `care plans` |
//! | `{{param}}` | `planId` |
//! | `{{paramType}}` | `string` (`string[]` for catch-all segments) |
//!
//! Segment names are not always identifiers (`[plan-id]`), so `{{param}}`
//! may only appear inside a string literal, e.g. `params['{{param}}']`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};

use crate::domain::error::{Result, TreemendError};
use crate::structure::delimiter_balance;

pub const BASIC_ENDPOINT: &str = "basic-endpoint";
pub const PARAMETERIZED_ENDPOINT: &str = "parameterized-endpoint";

const ROUTE_STEM: &str = "route";
const API_DIR: &str = "api";
const DEFAULT_PARAM: &str = "id";
const SAMPLE_PARAM: &str = "sample-id";

const BASIC_ENDPOINT_BODY: &str = r#"import { NextRequest, NextResponse } from 'next/server';

type {{Name}}Record = Record<string, unknown>;

const {{camel}}Store: {{Name}}Record[] = [];

export async function GET(_request: NextRequest) {
  return NextResponse.json({ {{camel}}: {{camel}}Store });
}

export async function POST(request: NextRequest) {
  let payload: {{Name}}Record;
  try {
    payload = await request.json();
  } catch {
    return NextResponse.json({ error: 'Invalid {{label}} payload' }, { status: 400 });
  }
  const created = { ...payload, id: String({{camel}}Store.length + 1) };
  {{camel}}Store.push(created);
  return NextResponse.json(created, { status: 201 });
}
"#;

const PARAMETERIZED_ENDPOINT_BODY: &str = r#"import { NextRequest, NextResponse } from 'next/server';

type {{Name}}Record = Record<string, unknown>;

interface RouteContext {
  params: { '{{param}}': {{paramType}} };
}

export async function GET(_request: NextRequest, { params }: RouteContext) {
  const {{camel}}Id = params['{{param}}'];
  if (!{{camel}}Id) {
    return NextResponse.json({ error: 'Missing {{label}} id' }, { status: 400 });
  }
  return NextResponse.json({ id: {{camel}}Id });
}

export async function PUT(request: NextRequest, { params }: RouteContext) {
  const {{camel}}Id = params['{{param}}'];
  let payload: {{Name}}Record;
  try {
    payload = await request.json();
  } catch {
    return NextResponse.json({ error: 'Invalid {{label}} payload' }, { status: 400 });
  }
  return NextResponse.json({ ...payload, id: {{camel}}Id });
}
"#;

/// A role → template body binding, as found in config files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateSpec {
    pub role: String,
    pub body: String,
}

pub fn builtin_templates() -> Vec<TemplateSpec> {
    vec![
        TemplateSpec {
            role: BASIC_ENDPOINT.to_string(),
            body: BASIC_ENDPOINT_BODY.to_string(),
        },
        TemplateSpec {
            role: PARAMETERIZED_ENDPOINT.to_string(),
            body: PARAMETERIZED_ENDPOINT_BODY.to_string(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Role derivation
// ---------------------------------------------------------------------------

/// Shape of a dynamic route segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParamKind {
    /// `[id]`
    #[default]
    Single,
    /// `[...slug]`
    CatchAll,
    /// `[[...slug]]`
    OptionalCatchAll,
}

impl ParamKind {
    /// TypeScript type of the route param.
    pub fn ts_type(self) -> &'static str {
        match self {
            ParamKind::Single => "string",
            ParamKind::CatchAll => "string[]",
            ParamKind::OptionalCatchAll => "string[] | undefined",
        }
    }
}

/// Values a template is rendered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleContext {
    pub role: String,
    pub name: String,
    pub param: Option<String>,
    pub param_kind: ParamKind,
}

impl RoleContext {
    fn sample() -> Self {
        Self {
            role: String::new(),
            name: "sample-item".to_string(),
            param: Some(SAMPLE_PARAM.to_string()),
            param_kind: ParamKind::Single,
        }
    }
}

/// Derive the role of a file from its root-relative path.
///
/// Returns `None` for anything that is not an endpoint route.
pub fn resolve_role(rel: &Path) -> Option<RoleContext> {
    if rel.file_stem().and_then(|s| s.to_str()) != Some(ROUTE_STEM) {
        return None;
    }

    let dirs: Vec<&str> = rel
        .parent()?
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let api_idx = dirs.iter().rposition(|d| *d == API_DIR)?;

    let mut name = None;
    let mut param = None;
    let mut param_kind = ParamKind::Single;
    for segment in &dirs[api_idx + 1..] {
        if is_route_group(segment) {
            continue;
        }
        match dynamic_inner(segment) {
            Some((inner, kind)) => {
                param = sanitize(inner);
                param_kind = kind;
            }
            None => name = sanitize(segment),
        }
    }

    let name = name?;
    let role = if param.is_some() {
        PARAMETERIZED_ENDPOINT
    } else {
        BASIC_ENDPOINT
    };
    Some(RoleContext {
        role: role.to_string(),
        name,
        param,
        param_kind,
    })
}

fn is_route_group(segment: &str) -> bool {
    segment.starts_with('(') && segment.ends_with(')')
}

/// `[id]`, `[...slug]` and `[[...slug]]` yield the inner name.
fn dynamic_inner(segment: &str) -> Option<(&str, ParamKind)> {
    let inner = segment.strip_prefix('[')?.strip_suffix(']')?;
    let (inner, optional) = match inner.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        Some(nested) => (nested, true),
        None => (inner, false),
    };
    match inner.strip_prefix("...") {
        Some(name) if optional => Some((name, ParamKind::OptionalCatchAll)),
        Some(name) => Some((name, ParamKind::CatchAll)),
        None => Some((inner, ParamKind::Single)),
    }
}

fn sanitize(segment: &str) -> Option<String> {
    let cleaned: String = segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.chars().any(|c| c.is_ascii_alphanumeric()) {
        Some(cleaned)
    } else {
        None
    }
}

fn words(name: &str) -> Vec<String> {
    name.split(|c: char| c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn identifier(raw: String) -> String {
    if raw.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{raw}")
    } else {
        raw
    }
}

pub fn pascal_case(name: &str) -> String {
    identifier(words(name).iter().map(|w| capitalize(w)).collect())
}

pub fn camel_case(name: &str) -> String {
    let words = words(name);
    let mut out = String::new();
    for (idx, word) in words.iter().enumerate() {
        if idx == 0 {
            out.push_str(word);
        } else {
            out.push_str(&capitalize(word));
        }
    }
    identifier(out)
}

pub fn label(name: &str) -> String {
    words(name).join(" ")
}

pub fn render(body: &str, ctx: &RoleContext) -> String {
    body.replace("{{name}}", &ctx.name)
        .replace("{{Name}}", &pascal_case(&ctx.name))
        .replace("{{camel}}", &camel_case(&ctx.name))
        .replace("{{label}}", &label(&ctx.name))
        .replace("{{param}}", ctx.param.as_deref().unwrap_or(DEFAULT_PARAM))
        .replace("{{paramType}}", ctx.param_kind.ts_type())
}

/// Whether the sample param shows up anywhere but inside a string literal.
fn param_unquoted(rendered: &str) -> bool {
    rendered.match_indices(SAMPLE_PARAM).any(|(idx, _)| {
        let before = rendered[..idx].chars().next_back();
        let after = rendered[idx + SAMPLE_PARAM.len()..].chars().next();
        !matches!(before, Some('\'' | '"' | '`')) || before != after
    })
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// What the rewriter did with a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    Rewritten { role: String, content: String },
    UnknownRole { reason: String },
}

/// Validated role → template map.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, String>,
    leftover: Regex,
}

impl TemplateRegistry {
    pub fn new(specs: Vec<TemplateSpec>) -> Result<Self> {
        let leftover = Regex::new(r"\{\{\s*[A-Za-z_]+\s*\}\}")
            .map_err(|e| TreemendError::Config(e.to_string()))?;
        let mut registry = Self {
            templates: BTreeMap::new(),
            leftover,
        };
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    pub fn builtin() -> Result<Self> {
        Self::new(builtin_templates())
    }

    /// Add or replace the template for `spec.role`.
    pub fn register(&mut self, spec: TemplateSpec) -> Result<()> {
        if spec.role.trim().is_empty() {
            return Err(TreemendError::InvalidTemplate {
                role: spec.role,
                reason: "role must not be empty".to_string(),
            });
        }

        let sample = render(&spec.body, &RoleContext::sample());
        if let Some(m) = self.leftover.find(&sample) {
            return Err(TreemendError::InvalidTemplate {
                role: spec.role,
                reason: format!("unknown placeholder {}", m.as_str()),
            });
        }
        if param_unquoted(&sample) {
            return Err(TreemendError::InvalidTemplate {
                role: spec.role,
                reason: "{{param}} must be quoted, e.g. params['{{param}}']".to_string(),
            });
        }
        if let Some(warning) = delimiter_balance(&sample).describe() {
            return Err(TreemendError::InvalidTemplate {
                role: spec.role,
                reason: warning,
            });
        }

        self.templates.insert(spec.role, spec.body);
        Ok(())
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn rewrite(&self, rel: &Path) -> RewriteOutcome {
        let Some(ctx) = resolve_role(rel) else {
            return RewriteOutcome::UnknownRole {
                reason: format!("{} is not an endpoint route", rel.display()),
            };
        };
        match self.templates.get(&ctx.role) {
            Some(body) => RewriteOutcome::Rewritten {
                content: render(body, &ctx),
                role: ctx.role,
            },
            None => RewriteOutcome::UnknownRole {
                reason: format!("no template registered for role {}", ctx.role),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::domain::file::Tier;

    #[test]
    fn test_basic_endpoint_role() {
        let ctx = resolve_role(Path::new("app/api/patients/route.ts")).expect("role");
        assert_eq!(ctx.role, BASIC_ENDPOINT);
        assert_eq!(ctx.name, "patients");
        assert_eq!(ctx.param, None);
    }

    #[test]
    fn test_parameterized_endpoint_role() {
        let ctx =
            resolve_role(Path::new("src/app/api/care-plans/[planId]/route.ts")).expect("role");
        assert_eq!(ctx.role, PARAMETERIZED_ENDPOINT);
        assert_eq!(ctx.name, "care-plans");
        assert_eq!(ctx.param.as_deref(), Some("planId"));
    }

    #[test]
    fn test_route_groups_and_catch_all() {
        let ctx = resolve_role(Path::new("app/(admin)/api/(v1)/docs/[...slug]/route.js"))
            .expect("role");
        assert_eq!(ctx.role, PARAMETERIZED_ENDPOINT);
        assert_eq!(ctx.name, "docs");
        assert_eq!(ctx.param.as_deref(), Some("slug"));
        assert_eq!(ctx.param_kind, ParamKind::CatchAll);

        let ctx = resolve_role(Path::new("app/api/docs/[[...slug]]/route.ts")).expect("role");
        assert_eq!(ctx.param.as_deref(), Some("slug"));
        assert_eq!(ctx.param_kind, ParamKind::OptionalCatchAll);
    }

    fn rewritten(registry: &TemplateRegistry, path: &str) -> String {
        match registry.rewrite(Path::new(path)) {
            RewriteOutcome::Rewritten { content, .. } => content,
            other => panic!("no rewrite for {path}: {other:?}"),
        }
    }

    #[test]
    fn test_non_identifier_segments_render_as_quoted_keys() {
        let registry = TemplateRegistry::builtin().expect("registry");

        let content = rewritten(&registry, "app/api/care-plans/[plan-id]/route.ts");
        assert!(content.contains("params: { 'plan-id': string };"));
        assert!(content.contains("const carePlansId = params['plan-id'];"));
        assert!(!content.contains("params.plan-id"));

        let content = rewritten(&registry, "app/api/codes/[2fa]/route.ts");
        assert!(content.contains("params: { '2fa': string };"));
        assert!(content.contains("params['2fa']"));

        let content = rewritten(&registry, "app/api/docs/[...slug]/route.ts");
        assert!(content.contains("params: { 'slug': string[] };"));
        assert!(content.contains("const docsId = params['slug'];"));

        let content = rewritten(&registry, "app/api/docs/[[...slug]]/route.ts");
        assert!(content.contains("params: { 'slug': string[] | undefined };"));
    }

    #[test]
    fn test_unquoted_param_template_rejected() {
        let err = TemplateRegistry::new(vec![TemplateSpec {
            role: PARAMETERIZED_ENDPOINT.to_string(),
            body: "export const get = (params: Record<string, string>) => params.{{param}};\n"
                .to_string(),
        }])
        .unwrap_err();
        assert!(matches!(err, TreemendError::InvalidTemplate { .. }));
        assert!(err.to_string().contains("quoted"));
    }

    #[test]
    fn test_non_routes_have_no_role() {
        assert!(resolve_role(Path::new("app/api/users/handler.ts")).is_none());
        assert!(resolve_role(Path::new("lib/users/route.ts")).is_none());
        assert!(resolve_role(Path::new("app/api/route.ts")).is_none());
    }

    #[test]
    fn test_case_helpers() {
        assert_eq!(pascal_case("care-plans"), "CarePlans");
        assert_eq!(camel_case("care_plans"), "carePlans");
        assert_eq!(label("Care-Plans"), "care plans");
        assert_eq!(camel_case("2fa"), "_2fa");
    }

    #[test]
    fn test_rewrite_uses_role_name() {
        let registry = TemplateRegistry::builtin().expect("registry");
        match registry.rewrite(Path::new("app/api/patients/route.ts")) {
            RewriteOutcome::Rewritten { role, content } => {
                assert_eq!(role, BASIC_ENDPOINT);
                assert!(content.contains("const patientsStore"));
                assert!(content.contains("type PatientsRecord"));
                assert!(!content.contains("{{"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_rendered_templates_are_clean() {
        let registry = TemplateRegistry::builtin().expect("registry");
        let classifier = Classifier::builtin().expect("classifier");
        for path in [
            "app/api/patients/route.ts",
            "app/api/care-plans/[planId]/route.ts",
            "app/api/care-plans/[plan-id]/route.ts",
            "app/api/docs/[...slug]/route.ts",
        ] {
            let RewriteOutcome::Rewritten { content, .. } = registry.rewrite(Path::new(path))
            else {
                panic!("no rewrite for {path}");
            };
            let c = classifier.classify(&content);
            assert_eq!(c.tier, Tier::Clean, "{path}: {:?}", c.signatures);
        }
    }

    #[test]
    fn test_missing_template_is_unknown_role() {
        let registry = TemplateRegistry::new(vec![TemplateSpec {
            role: BASIC_ENDPOINT.to_string(),
            body: BASIC_ENDPOINT_BODY.to_string(),
        }])
        .expect("registry");
        let outcome = registry.rewrite(Path::new("app/api/users/[id]/route.ts"));
        assert!(matches!(outcome, RewriteOutcome::UnknownRole { .. }));
    }

    #[test]
    fn test_unbalanced_template_rejected() {
        let err = TemplateRegistry::new(vec![TemplateSpec {
            role: "broken".to_string(),
            body: "export function {{camel}}() {\n".to_string(),
        }])
        .unwrap_err();
        assert!(matches!(err, TreemendError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let err = TemplateRegistry::new(vec![TemplateSpec {
            role: "typo".to_string(),
            body: "export const {{camle}} = 1;\n".to_string(),
        }])
        .unwrap_err();
        assert!(err.to_string().contains("{{camle}}"));
    }
}
