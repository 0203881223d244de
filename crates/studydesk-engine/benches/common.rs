// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
#[allow(dead_code)]
pub fn generate_note_markup(sections: usize) -> String {
    let mut content = String::from("<h1>Geography</h1>");
    for section in 0..sections {
        content.push_str(&format!(
            "<h2>Region {section}</h2><p>Rivers of <strong>region {section}</strong> are <em>long</em>.</p>\
             <ul><li>Source</li><li>Mouth</li></ul>"
        ));
    }
    content
}

/// Markup as pasted from a word processor: nested containers, inline styling
/// attributes and elements the sanitizer must unwrap.
#[allow(dead_code)]
pub fn generate_pasted_markup(paragraphs: usize) -> String {
    let mut content = String::from("<div class=\"WordSection1\">");
    for i in 0..paragraphs {
        content.push_str(&format!(
            "<p class=\"MsoNormal\" style=\"margin:0\"><span lang=\"EN\"><b>Point {i}</b>: \
             <font face=\"Arial\">details &amp; notes</font><br></span></p>\
             <!--[if gte mso 9]><xml></xml><![endif]--><script>track({i})</script>"
        ));
    }
    content.push_str("</div>");
    content
}
