use urlencoding::encode;

use crate::core::GenerationResult;
use crate::utils::text::escape_html;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>{title}</title>
    <link rel="stylesheet" href="/static/style.css">
  </head>
  <body>
{body}
  </body>
</html>
"#,
        title = escape_html(title),
        body = body
    )
}

/// 首页表单，`prompt` 用于“编辑提示词”时回填
pub fn index_page(prompt: &str) -> String {
    let body = format!(
        r#"    <h1>Generate an AI Image</h1>
    <form action="/generate" method="post" enctype="multipart/form-data">
      <label for="prompt">Enter a prompt:</label><br>
      <textarea id="prompt" name="prompt" required>{prompt}</textarea><br>
      <label for="seed">Seed (optional):</label>
      <input id="seed" name="seed" type="number" step="1"><br>
      <label for="reference_image">Reference image (optional):</label>
      <input id="reference_image" name="reference_image" type="file" accept="image/*"><br><br>
      <button type="submit">Generate Image</button>
    </form>"#,
        prompt = escape_html(prompt)
    );
    layout("Adobe Firefly AI Image Generator", &body)
}

pub fn result_page(prompt: &str, result: &GenerationResult) -> String {
    let encoded_prompt = encode(prompt);
    let encoded_url = encode(&result.image_url);
    let body = format!(
        r#"    <h1>Generated Image for Prompt:</h1>
    <p><em>{prompt}</em></p>
    <img src="{image_url}" alt="Generated Image"/>
    <p class="seed">Seed: {seed}</p>
    <div class="content">
      <a href="/">Start over</a> |
      <a href="/?prompt={encoded_prompt}">Edit the prompt</a> |
      <a href="/generate?prompt={encoded_prompt}">Regenerate with the same prompt</a> |
      <a href="/generate?prompt={encoded_prompt}&amp;seed={seed}">Regenerate similar</a><br><br>
      <a href="/download?imageUrl={encoded_url}"><button>Download Image</button></a>
    </div>"#,
        prompt = escape_html(prompt),
        image_url = escape_html(&result.image_url),
        seed = result.seed,
        encoded_prompt = encoded_prompt,
        encoded_url = encoded_url,
    );
    layout("Generated Image", &body)
}
