//! In-page element resolution.
//!
//! Every element operation is a single `Runtime.evaluate` of [`RESOLVER`]
//! applied to a serialized [`JsQuery`], an operation name, and an argument.
//! The script answers `{found, value}`; `found` is false when the target
//! matches nothing.

use filler_engine::{Query, Target};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute placed on the element chosen by a `mark` operation.
pub const MARK_ATTR: &str = "data-filler-target";

/// CSS selector for the marked element.
pub fn marked_selector() -> String {
    format!("[{MARK_ATTR}]")
}

/// A [`Target`] in the shape the resolver script reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JsQuery {
    Css {
        css: String,
        has_text: Option<String>,
        nth: Option<i32>,
    },
    Xpath {
        xpath: String,
        nth: Option<i32>,
    },
    Role {
        role: String,
        name: Option<String>,
        exact: bool,
        nth: Option<i32>,
    },
    Text {
        text: String,
        exact: bool,
        nth: Option<i32>,
    },
    Label {
        text: String,
        exact: bool,
        nth: Option<i32>,
    },
    /// Whatever has focus, or the body.
    Focused,
}

impl From<&Target> for JsQuery {
    fn from(target: &Target) -> Self {
        let nth = target.nth;
        match &target.query {
            Query::Css { css, has_text } => JsQuery::Css {
                css: css.clone(),
                has_text: has_text.clone(),
                nth,
            },
            Query::XPath(xpath) => JsQuery::Xpath {
                xpath: xpath.clone(),
                nth,
            },
            Query::Role { role, name, exact } => JsQuery::Role {
                role: role.clone(),
                name: name.clone(),
                exact: *exact,
                nth,
            },
            Query::Text { text, exact } => JsQuery::Text {
                text: text.clone(),
                exact: *exact,
                nth,
            },
            Query::Label { text, exact } => JsQuery::Label {
                text: text.clone(),
                exact: *exact,
                nth,
            },
        }
    }
}

/// What the resolver script returns.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reply {
    pub found: bool,
    #[serde(default)]
    pub value: Value,
}

/// Element operations understood by [`RESOLVER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Count,
    Visible,
    Disabled,
    Mark,
    Text,
    Attribute,
    Fill,
    Select,
    Labels,
    Checked,
    Scroll,
    ForceClick,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Count => "count",
            Op::Visible => "visible",
            Op::Disabled => "disabled",
            Op::Mark => "mark",
            Op::Text => "text",
            Op::Attribute => "attr",
            Op::Fill => "fill",
            Op::Select => "select",
            Op::Labels => "labels",
            Op::Checked => "checked",
            Op::Scroll => "scroll",
            Op::ForceClick => "force_click",
        }
    }
}

/// Build the expression evaluated for one operation.
pub fn expression(query: &JsQuery, op: Op, arg: &Value) -> String {
    let query = serde_json::to_string(query).unwrap_or_else(|_| "null".into());
    let arg = serde_json::to_string(arg).unwrap_or_else(|_| "null".into());
    format!("({RESOLVER})({query}, {:?}, {arg})", op.as_str())
}

/// Replaces blocking dialogs on every new document.
pub const DISMISS_DIALOGS: &str = r#"
window.alert = () => {};
window.confirm = () => true;
window.prompt = () => null;
window.onbeforeunload = null;
"#;

pub const RESOLVER: &str = r#"
(query, op, arg) => {
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const matches = (have, want, exact) => exact
    ? norm(have) === norm(want)
    : norm(have).toLowerCase().includes(norm(want).toLowerCase());

  const implicitRole = (el) => {
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || '').toLowerCase();
    if (tag === 'button') return 'button';
    if (tag === 'a' && el.hasAttribute('href')) return 'link';
    if (tag === 'select') return el.multiple ? 'listbox' : 'combobox';
    if (tag === 'textarea') return 'textbox';
    if (tag === 'option') return 'option';
    if (/^h[1-6]$/.test(tag)) return 'heading';
    if (tag === 'input') {
      if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
      if (type === 'checkbox') return 'checkbox';
      if (type === 'radio') return 'radio';
      if (['', 'text', 'email', 'tel', 'url', 'search', 'password', 'number'].includes(type)) return 'textbox';
    }
    return null;
  };

  const accessibleName = (el) => {
    const aria = el.getAttribute('aria-label');
    if (aria) return aria;
    const by = el.getAttribute('aria-labelledby');
    if (by) {
      return by.split(/\s+/).map((id) => norm(document.getElementById(id)?.innerText)).join(' ');
    }
    if (el.labels && el.labels.length) {
      return Array.from(el.labels).map((l) => norm(l.innerText)).join(' ');
    }
    return norm(el.innerText) || el.value || el.getAttribute('title') || el.getAttribute('alt') || '';
  };

  const textOf = (el) => el.innerText || el.textContent || (el.value ?? '');
  const all = () => Array.from(document.querySelectorAll('*'));

  const resolve = () => {
    switch (query.kind) {
      case 'focused':
        return [document.activeElement || document.body];
      case 'css': {
        let found = Array.from(document.querySelectorAll(query.css));
        if (query.has_text != null) {
          found = found.filter((el) => matches(textOf(el), query.has_text, false));
        }
        return found;
      }
      case 'xpath': {
        const snap = document.evaluate(query.xpath, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
        const found = [];
        for (let i = 0; i < snap.snapshotLength; i++) found.push(snap.snapshotItem(i));
        return found;
      }
      case 'role':
        return all().filter((el) => {
          const role = el.getAttribute('role') || implicitRole(el);
          if (role !== query.role) return false;
          return query.name == null || matches(accessibleName(el), query.name, query.exact);
        });
      case 'text': {
        const hits = all().filter((el) => !['SCRIPT', 'STYLE', 'HEAD', 'HTML'].includes(el.tagName)
          && matches(textOf(el), query.text, query.exact));
        return hits.filter((el) => !hits.some((other) => other !== el && el.contains(other)));
      }
      case 'label': {
        const found = [];
        for (const label of document.querySelectorAll('label')) {
          if (matches(label.innerText, query.text, query.exact) && label.control) found.push(label.control);
        }
        for (const el of document.querySelectorAll('[aria-label]')) {
          if (matches(el.getAttribute('aria-label'), query.text, query.exact)) found.push(el);
        }
        return found;
      }
      default:
        return [];
    }
  };

  const found = resolve();
  if (op === 'count') return { found: true, value: found.length };

  let index = query.nth == null ? 0 : query.nth;
  if (index < 0) index += found.length;
  const el = found[index];
  if (!el) return { found: false, value: null };

  const visible = () => {
    const style = getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    return style.visibility !== 'hidden' && style.display !== 'none' && rect.width > 0 && rect.height > 0;
  };
  const fire = (name) => el.dispatchEvent(new Event(name, { bubbles: true }));

  switch (op) {
    case 'visible':
      return { found: true, value: visible() };
    case 'disabled':
      return { found: true, value: !!el.disabled || el.getAttribute('aria-disabled') === 'true' };
    case 'mark':
      for (const old of document.querySelectorAll('[data-filler-target]')) old.removeAttribute('data-filler-target');
      el.setAttribute('data-filler-target', '1');
      el.scrollIntoView({ block: 'center', inline: 'center' });
      return { found: true, value: visible() };
    case 'text':
      return { found: true, value: el.innerText ?? el.textContent ?? '' };
    case 'attr':
      return { found: true, value: el.getAttribute(arg) };
    case 'fill': {
      el.focus();
      const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
      const setter = Object.getOwnPropertyDescriptor(proto, 'value')?.set;
      if (setter && (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement)) setter.call(el, arg);
      else if (el.isContentEditable) el.innerText = arg;
      else el.value = arg;
      fire('input');
      fire('change');
      return { found: true, value: true };
    }
    case 'select': {
      const options = Array.from(el.options || []);
      const option = options.find((o) => arg.by === 'label' ? norm(o.label || o.text) === norm(arg.text) : o.value === arg.text);
      if (!option) return { found: true, value: false };
      el.value = option.value;
      option.selected = true;
      fire('input');
      fire('change');
      return { found: true, value: true };
    }
    case 'labels':
      return { found: true, value: Array.from(el.options || []).map((o) => norm(o.label || o.text)) };
    case 'checked': {
      const input = el.tagName === 'LABEL' && el.control ? el.control : el;
      return { found: true, value: !!input.checked };
    }
    case 'scroll':
      el.scrollIntoView({ block: 'center', inline: 'center' });
      return { found: true, value: true };
    case 'force_click':
      el.click();
      return { found: true, value: true };
    default:
      return { found: true, value: null };
  }
}
"#;
