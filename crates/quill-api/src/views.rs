//! Server-rendered HTML pages.
//!
//! Every piece of user-supplied text goes through [`escape`] before it is
//! interpolated.

use std::fmt::Write;

use quill_db::models::{CommentRow, PostRow, UserRow};
use quill_types::forms::TITLE_MAX;
use quill_types::models::{Flash, Viewer, parse_timestamp};

use crate::policy::{can_delete_comment, can_modify_post};

const STYLE: &str = "
body { font-family: sans-serif; max-width: 48rem; margin: 0 auto; padding: 1rem; color: #222; }
nav { display: flex; gap: 1rem; align-items: center; border-bottom: 1px solid #ddd; padding-bottom: .5rem; }
nav .spacer { flex: 1; }
.flash { padding: .5rem 1rem; border-radius: 4px; margin: 1rem 0; }
.flash.success { background: #e6f4ea; }
.flash.error { background: #fce8e6; }
.flash.info { background: #e8f0fe; }
article { border-bottom: 1px solid #eee; padding: .5rem 0; }
.meta { color: #777; font-size: .85rem; }
.avatar { width: 32px; height: 32px; border-radius: 50%; object-fit: cover; vertical-align: middle; }
.avatar.large { width: 96px; height: 96px; }
form.inline { display: inline; }
label { display: block; margin-top: .5rem; }
input[type=text], input[type=email], input[type=password], textarea { width: 100%; box-sizing: border-box; }
textarea { min-height: 8rem; }
";

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn display_time(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| escape(raw))
}

fn avatar_img(avatar: Option<&str>, class: &str) -> String {
    match avatar {
        Some(path) => format!(r#"<img class="{}" src="/static/{}" alt="avatar">"#, class, escape(path)),
        None => String::new(),
    }
}

fn layout(title: &str, viewer: &Viewer, flash: Option<&Flash>, body: &str) -> String {
    page(title, &nav_links(viewer), flash, body)
}

fn nav_links(viewer: &Viewer) -> String {
    match viewer.user() {
        Some(user) => format!(
            r#"<a href="/create">New post</a><span class="spacer"></span>
<a href="/profile">{} {}</a>
<a href="/logout">Log out</a>"#,
            avatar_img(user.avatar.as_deref(), "avatar"),
            escape(&user.username),
        ),
        None => r#"<span class="spacer"></span>
<a href="/login">Log in</a>
<a href="/register">Register</a>"#
            .to_string(),
    }
}

/// Error pages render with an empty `nav`.
fn page(title: &str, nav: &str, flash: Option<&Flash>, body: &str) -> String {
    let flash = flash
        .map(|f| format!(r#"<div class="flash {}">{}</div>"#, f.kind.as_str(), escape(&f.message)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{} · Quill</title>
<style>{}</style>
</head>
<body>
<nav><a href="/"><strong>Quill</strong></a>
{}
</nav>
{}
<main>
{}
</main>
</body>
</html>"#,
        escape(title),
        STYLE,
        nav,
        flash,
        body,
    )
}

fn post_summary(out: &mut String, post: &PostRow) {
    let _ = write!(
        out,
        r#"<article>
<h2><a href="/post/{id}">{title}</a></h2>
<p class="meta">by {author} on {time} · {count} comment{plural}</p>
</article>
"#,
        id = post.id,
        title = escape(&post.title),
        author = escape(&post.author_username),
        time = display_time(&post.created_at),
        count = post.comment_count,
        plural = if post.comment_count == 1 { "" } else { "s" },
    );
}

pub fn index(viewer: &Viewer, flash: Option<&Flash>, posts: &[PostRow]) -> String {
    let mut body = String::from("<h1>Latest posts</h1>\n");
    if posts.is_empty() {
        body.push_str("<p>No posts yet.</p>\n");
    }
    for post in posts {
        post_summary(&mut body, post);
    }
    layout("Home", viewer, flash, &body)
}

pub fn login(viewer: &Viewer, flash: Option<&Flash>) -> String {
    let body = r#"<h1>Log in</h1>
<form method="post" action="/login">
<label>Username <input type="text" name="username" required></label>
<label>Password <input type="password" name="password" required></label>
<p><button type="submit">Log in</button></p>
</form>
<p>No account yet? <a href="/register">Register</a>.</p>"#;
    layout("Log in", viewer, flash, body)
}

pub fn register(viewer: &Viewer, flash: Option<&Flash>) -> String {
    let body = r#"<h1>Register</h1>
<form method="post" action="/register">
<label>Username <input type="text" name="username" minlength="3" maxlength="20" required></label>
<label>Email <input type="email" name="email" maxlength="123" required></label>
<label>Password <input type="password" name="password" minlength="8" required></label>
<p><button type="submit">Register</button></p>
</form>"#;
    layout("Register", viewer, flash, body)
}

/// Create form when `post` is `None`, edit form otherwise.
pub fn post_form(viewer: &Viewer, flash: Option<&Flash>, action: &str, post: Option<&PostRow>) -> String {
    let (heading, title, content) = match post {
        Some(post) => ("Edit post", escape(&post.title), escape(&post.content)),
        None => ("New post", String::new(), String::new()),
    };

    let body = format!(
        r#"<h1>{heading}</h1>
<form method="post" action="{action}">
<label>Title <input type="text" name="title" maxlength="{max}" value="{title}" required></label>
<label>Content <textarea name="content" required>{content}</textarea></label>
<p><button type="submit">Save</button></p>
</form>"#,
        heading = heading,
        action = escape(action),
        max = TITLE_MAX,
        title = title,
        content = content,
    );
    layout(heading, viewer, flash, &body)
}

pub fn post_detail(viewer: &Viewer, flash: Option<&Flash>, post: &PostRow, comments: &[CommentRow]) -> String {
    let mut body = format!(
        r#"<article>
<h1>{title}</h1>
<p class="meta">by {author} on {time}</p>
<div class="content">{content}</div>
</article>
"#,
        title = escape(&post.title),
        author = escape(&post.author_username),
        time = display_time(&post.created_at),
        content = escape(&post.content).replace('\n', "<br>\n"),
    );

    if let Some(user_id) = viewer.id() {
        if can_modify_post(user_id, post) {
            let _ = write!(
                body,
                r#"<p><a href="/edit/{id}">Edit</a>
<form class="inline" method="post" action="/delete/{id}"><button type="submit">Delete post</button></form></p>
"#,
                id = post.id,
            );
        }
    }

    let _ = writeln!(body, "<h2>Comments ({})</h2>", comments.len());
    for comment in comments {
        let delete = match viewer.id() {
            Some(user_id) if can_delete_comment(user_id, comment) => format!(
                r#" <form class="inline" method="post" action="/comment/delete/{}"><button type="submit">Delete</button></form>"#,
                comment.id,
            ),
            _ => String::new(),
        };
        let _ = write!(
            body,
            r#"<article>
<p>{content}</p>
<p class="meta">{author} · {time}{delete}</p>
</article>
"#,
            content = escape(&comment.content),
            author = escape(&comment.author_username),
            time = display_time(&comment.created_at),
            delete = delete,
        );
    }

    if viewer.user().is_some() {
        let _ = write!(
            body,
            r#"<form method="post" action="/post/{}">
<label>Add a comment <textarea name="content" required></textarea></label>
<p><button type="submit">Comment</button></p>
</form>"#,
            post.id,
        );
    } else {
        body.push_str(r#"<p><a href="/login">Log in</a> to comment.</p>"#);
    }

    layout(&post.title, viewer, flash, &body)
}

pub fn profile(viewer: &Viewer, flash: Option<&Flash>, user: &UserRow, posts: &[PostRow]) -> String {
    let mut body = format!(
        r#"<h1>{avatar} {username}</h1>
<p class="meta">{email} · joined {joined}</p>
<form method="post" action="/profile" enctype="multipart/form-data">
<label>Avatar (png, jpg, jpeg, gif) <input type="file" name="avatar" accept=".png,.jpg,.jpeg,.gif" required></label>
<p><button type="submit">Upload</button></p>
</form>
<h2>Your posts</h2>
"#,
        avatar = avatar_img(user.avatar.as_deref(), "avatar large"),
        username = escape(&user.username),
        email = escape(&user.email),
        joined = display_time(&user.created_at),
    );
    if posts.is_empty() {
        body.push_str("<p>You have not written anything yet.</p>\n");
    }
    for post in posts {
        post_summary(&mut body, post);
    }
    layout("Profile", viewer, flash, &body)
}

pub fn not_found() -> String {
    page("Not found", "", None, "<h1>404</h1><p>That page does not exist.</p>")
}

pub fn server_error() -> String {
    page("Error", "", None, "<h1>500</h1><p>Something went wrong.</p>")
}
