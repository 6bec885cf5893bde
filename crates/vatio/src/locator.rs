//! Element location over hostile markup.
//!
//! The players redesign their DOM frequently and resist synthetic
//! interaction, so location never depends on stable selectors alone.
//! The primitive here is "find the first element whose normalized text
//! or label matches, inside a prioritized list of root scopes", compiled
//! to a JavaScript query executed through a [`PageDriver`]. When several
//! elements match, the bottom-most wins: transport and speed controls
//! conventionally live at the bottom of the viewport.
//!
//! Exhausting every root or the scroll budget yields `None`, not an
//! error. Callers decide whether a missing element is fatal.

use crate::driver::PageDriver;
use crate::error::VatioResult;
use serde::{Deserialize, Serialize};

/// Ancestor levels inspected when climbing to a clickable element.
const CLIMB_DEPTH: usize = 6;

/// Scroll sweep steps in each direction inside a selection surface.
pub const DEFAULT_SCROLL_STEPS: usize = 14;

/// Canonical form for visible-text comparison: trimmed, lowercased, the
/// multiplication sign folded to `x`, and all whitespace removed. `"1.5 X"`
/// and `"1.5×"` both normalize to `"1.5x"`.
#[must_use]
pub fn normalize_label(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace('\u{00d7}', "x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Rendered geometry of a located element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge in viewport coordinates
    pub x: f64,
    /// Top edge in viewport coordinates
    pub y: f64,
    /// Rendered width
    pub width: f64,
    /// Rendered height
    pub height: f64,
}

impl BoundingBox {
    /// Center point, the click target.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Result of a locate operation. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Geometry of the clickable element (after climbing)
    #[serde(flatten)]
    pub bbox: BoundingBox,
    /// Trimmed visible text or accessible label
    pub label: String,
    /// Auxiliary identifier (`data-testid` or `id`) when present
    pub aux_id: Option<String>,
    /// Which strategy matched: `text`, `aria`, or `css`
    pub strategy: String,
}

fn js_string_array(items: &[&str]) -> String {
    // serde escaping keeps embedded quotes in selectors intact
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Build the scoped text-search query. Scans each root in priority
/// order, collects elements whose normalized text or aria-label equals
/// one of `targets`, prefers the bottom-most match, then climbs to the
/// nearest clickable visible ancestor.
#[must_use]
pub fn text_query_js(roots: &[&str], targets: &[&str], min_x: f64) -> String {
    format!(
        r#"(() => {{
  const norm = s => (s || '').trim().toLowerCase().replace(/×/g, 'x').replace(/\s+/g, '');
  const targets = {targets};
  const roots = {roots};
  const minX = {min_x};
  const climb = (el) => {{
    let cur = el;
    for (let i = 0; i < {depth} && cur; i++) {{
      const cs = getComputedStyle(cur);
      const r = cur.getBoundingClientRect();
      const clickable =
        cur.tagName?.toLowerCase() === 'button' ||
        cur.getAttribute?.('role') === 'button' ||
        cs.cursor === 'pointer' ||
        cur.onclick ||
        cur.tabIndex === 0;
      if (clickable && r.width > 2 && r.height > 2) return cur;
      cur = cur.parentElement;
    }}
    return null;
  }};
  for (const sel of roots) {{
    let root;
    try {{ root = document.querySelector(sel); }} catch (e) {{ continue; }}
    if (!root) continue;
    const matches = [];
    for (const el of root.querySelectorAll('*')) {{
      const t = norm(el.textContent);
      const a = norm(el.getAttribute?.('aria-label'));
      let strategy = null;
      if (targets.includes(t)) strategy = 'text';
      else if (targets.includes(a)) strategy = 'aria';
      if (!strategy) continue;
      const r = el.getBoundingClientRect();
      if (!(r.width > 2 && r.height > 2)) continue;
      if (r.x < minX) continue;
      matches.push({{ el, r, strategy }});
    }}
    if (!matches.length) continue;
    matches.sort((m, n) => n.r.y - m.r.y);
    const best = matches[0];
    const target = climb(best.el) || best.el;
    const r = target.getBoundingClientRect();
    return {{
      x: r.x, y: r.y, width: r.width, height: r.height,
      label: (best.el.textContent || best.el.getAttribute('aria-label') || '').trim().slice(0, 60),
      aux_id: target.getAttribute('data-testid') || target.id || null,
      strategy: best.strategy
    }};
  }}
  return null;
}})()"#,
        targets = js_string_array(targets),
        roots = js_string_array(roots),
        min_x = min_x,
        depth = CLIMB_DEPTH,
    )
}

/// Build the current-speed-label query: like [`text_query_js`] but
/// matching any label of the `Nx` family (`1x`, `1.5x`, `2×`) instead
/// of an exact target. Used to read the player's current speed.
#[must_use]
pub fn speed_query_js(roots: &[&str]) -> String {
    format!(
        r#"(() => {{
  const norm = s => (s || '').trim().toLowerCase().replace(/×/g, 'x').replace(/\s+/g, '');
  const isSpeed = t => /^\d+(?:\.\d+)?x$/.test(t);
  const roots = {roots};
  const climb = (el) => {{
    let cur = el;
    for (let i = 0; i < {depth} && cur; i++) {{
      const cs = getComputedStyle(cur);
      const r = cur.getBoundingClientRect();
      const clickable =
        cur.tagName?.toLowerCase() === 'button' ||
        cur.getAttribute?.('role') === 'button' ||
        cs.cursor === 'pointer' ||
        cur.onclick ||
        cur.tabIndex === 0;
      if (clickable && r.width > 2 && r.height > 2) return cur;
      cur = cur.parentElement;
    }}
    return null;
  }};
  for (const sel of roots) {{
    let root;
    try {{ root = document.querySelector(sel); }} catch (e) {{ continue; }}
    if (!root) continue;
    const matches = [];
    for (const el of root.querySelectorAll('*')) {{
      const t = norm(el.textContent);
      if (!isSpeed(t)) continue;
      const r = el.getBoundingClientRect();
      if (!(r.width > 2 && r.height > 2)) continue;
      matches.push({{ el, r, t }});
    }}
    if (!matches.length) continue;
    matches.sort((m, n) => n.r.y - m.r.y);
    const best = matches[0];
    const target = climb(best.el) || best.el;
    const r = target.getBoundingClientRect();
    return {{
      x: r.x, y: r.y, width: r.width, height: r.height,
      label: best.t,
      aux_id: target.getAttribute('data-testid') || target.id || null,
      strategy: 'text'
    }};
  }}
  return null;
}})()"#,
        roots = js_string_array(roots),
        depth = CLIMB_DEPTH,
    )
}

/// Build the CSS-selector query: first visible element matching any of
/// the selectors, tried in order. Invalid selectors are skipped.
#[must_use]
pub fn css_query_js(selectors: &[&str]) -> String {
    format!(
        r#"(() => {{
  const sels = {sels};
  for (const sel of sels) {{
    let el;
    try {{ el = document.querySelector(sel); }} catch (e) {{ continue; }}
    if (!el) continue;
    const r = el.getBoundingClientRect();
    if (!(r.width > 2 && r.height > 2)) continue;
    return {{
      x: r.x, y: r.y, width: r.width, height: r.height,
      label: (el.textContent || el.getAttribute('aria-label') || '').trim().slice(0, 60),
      aux_id: el.getAttribute('data-testid') || el.id || null,
      strategy: 'css'
    }};
  }}
  return null;
}})()"#,
        sels = js_string_array(selectors),
    )
}

/// Build the live-media probe. Pierces open shadow roots and
/// same-origin iframes; cross-origin frames are skipped.
#[must_use]
pub fn media_probe_js() -> String {
    r#"(() => {
  const found = [];
  const visit = (root) => {
    let nodes;
    try { nodes = root.querySelectorAll('*'); } catch (e) { return; }
    for (const el of nodes) {
      if (el.tagName === 'AUDIO' || el.tagName === 'VIDEO') found.push(el);
      if (el.shadowRoot) visit(el.shadowRoot);
      if (el.tagName === 'IFRAME') {
        try { if (el.contentDocument) visit(el.contentDocument); } catch (e) {}
      }
    }
  };
  visit(document);
  if (!found.length) return { present: false, playing: false };
  const playing = found.some(m => !m.paused && !m.ended && m.currentTime > 0);
  return { present: true, playing };
})()"#
        .to_string()
}

/// Build one scroll step inside the first visible selection surface.
/// Returns `true` when the offset actually moved.
#[must_use]
pub fn scroll_step_js(menu_roots: &[&str], upward: bool) -> String {
    let delta = if upward {
        "Math.max(0, el.scrollTop - el.clientHeight * 0.9)"
    } else {
        "el.scrollTop + el.clientHeight * 0.9"
    };
    format!(
        r#"(() => {{
  const sels = {sels};
  for (const sel of sels) {{
    let el;
    try {{ el = document.querySelector(sel); }} catch (e) {{ continue; }}
    if (!el) continue;
    const r = el.getBoundingClientRect();
    if (!(r.width > 2 && r.height > 2)) continue;
    const before = el.scrollTop;
    el.scrollTop = {delta};
    return el.scrollTop !== before;
  }}
  return false;
}})()"#,
        sels = js_string_array(menu_roots),
        delta = delta,
    )
}

fn parse_descriptor(value: serde_json::Value) -> Option<ElementDescriptor> {
    serde_json::from_value(value).ok()
}

/// Locate the bottom-most visible element whose normalized text or
/// label equals any of `targets`, scanning `roots` in priority order.
pub async fn locate_any(
    driver: &dyn PageDriver,
    roots: &[&str],
    targets: &[&str],
    min_x: f64,
) -> VatioResult<Option<ElementDescriptor>> {
    let normalized: Vec<String> = targets.iter().map(|t| normalize_label(t)).collect();
    let normalized: Vec<&str> = normalized.iter().map(String::as_str).collect();
    let value = driver.evaluate(&text_query_js(roots, &normalized, min_x)).await?;
    Ok(parse_descriptor(value))
}

/// Locate a single normalized label. See [`locate_any`].
pub async fn locate_by_text(
    driver: &dyn PageDriver,
    roots: &[&str],
    target: &str,
) -> VatioResult<Option<ElementDescriptor>> {
    locate_any(driver, roots, &[target], 0.0).await
}

/// Locate the player's current speed label (`Nx` family) within the
/// prioritized control-region roots. The returned descriptor's `label`
/// carries the normalized current value.
pub async fn locate_speed_label(
    driver: &dyn PageDriver,
    roots: &[&str],
) -> VatioResult<Option<ElementDescriptor>> {
    let value = driver.evaluate(&speed_query_js(roots)).await?;
    Ok(parse_descriptor(value))
}

/// Locate the first visible element matching any CSS selector.
pub async fn locate_by_css(
    driver: &dyn PageDriver,
    selectors: &[&str],
) -> VatioResult<Option<ElementDescriptor>> {
    if selectors.is_empty() {
        return Ok(None);
    }
    let value = driver.evaluate(&css_query_js(selectors)).await?;
    Ok(parse_descriptor(value))
}

/// Click the center of a located element.
pub async fn click(driver: &dyn PageDriver, descriptor: &ElementDescriptor) -> VatioResult<()> {
    let (x, y) = descriptor.bbox.center();
    driver.click_at(x, y).await
}

/// Probe for a live media element anywhere in the document, including
/// shadow hierarchies and same-origin frames.
pub async fn media_is_playing(driver: &dyn PageDriver) -> VatioResult<bool> {
    let value = driver.evaluate(&media_probe_js()).await?;
    Ok(value
        .get("playing")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false))
}

/// Sweep a scrollable selection surface looking for `target`: upward
/// first, then downward, re-querying after each step, each direction
/// bounded by `steps`. A sweep ends early when the surface stops
/// moving (edge reached or surface gone).
pub async fn reveal_in_scrollable(
    driver: &dyn PageDriver,
    menu_roots: &[&str],
    target: &str,
    steps: usize,
) -> VatioResult<Option<ElementDescriptor>> {
    for upward in [true, false] {
        for _ in 0..steps {
            let moved = driver
                .evaluate(&scroll_step_js(menu_roots, upward))
                .await?
                .as_bool()
                .unwrap_or(false);
            driver.wait_ms(120).await?;
            if let Some(found) = locate_any(driver, menu_roots, &[target], 0.0).await? {
                return Ok(Some(found));
            }
            if !moved {
                break;
            }
        }
    }
    Ok(None)
}
