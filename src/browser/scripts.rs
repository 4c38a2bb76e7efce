/// Attributes lazy-loading libraries use instead of `src`, in priority order.
pub const LAZY_SRC_ATTRIBUTES: [&str; 4] = ["data-src", "data-lazy-src", "data-original", "data-srcset"];

/// Collects every `<img>` in document order with its geometry.
pub fn generate_image_enumeration_script() -> String {
    let lazy_attrs = LAZY_SRC_ATTRIBUTES
        .iter()
        .map(|a| format!("'{}'", a))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"
        (() => {{
            const lazyAttrs = [{lazy_attrs}];
            return Array.from(document.querySelectorAll('img')).map((img) => {{
                let lazySrc = null;
                for (const attr of lazyAttrs) {{
                    const value = img.getAttribute(attr);
                    if (value && value.trim().length > 0) {{
                        lazySrc = value.trim();
                        break;
                    }}
                }}
                const rect = img.getBoundingClientRect();
                return {{
                    src: img.getAttribute('src') ? img.src : null,
                    lazySrc: lazySrc,
                    alt: img.getAttribute('alt'),
                    title: img.getAttribute('title'),
                    naturalWidth: img.naturalWidth || 0,
                    naturalHeight: img.naturalHeight || 0,
                    renderedWidth: Math.round(rect.width) || 0,
                    renderedHeight: Math.round(rect.height) || 0,
                }};
            }});
        }})()
        "#,
        lazy_attrs = lazy_attrs
    )
}

/// Scrolls to the bottom and reports the new document height.
pub fn generate_scroll_script() -> &'static str {
    r#"
    (() => {
        window.scrollTo(0, document.body.scrollHeight);
        return document.body.scrollHeight;
    })()
    "#
}

pub fn generate_page_height_script() -> &'static str {
    "document.body ? document.body.scrollHeight : 0"
}
