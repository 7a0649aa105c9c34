use std::sync::Arc;

use cutwork::{compile, compile_with, Bindings, Config, Library, RenderError, Value};

fn render_with(source: &str, bindings: &mut Bindings) -> String {
    compile(source)
        .unwrap()
        .render(bindings, &Library::new())
        .unwrap()
}

fn render(source: &str) -> String {
    render_with(source, &mut Bindings::default())
}

// ── End-to-end ──

#[test]
fn greeting_with_if_else() {
    let template = "Hi {{ name }}! {% if show %}Yes{% else %}No{% end %}";
    let mut bindings = Bindings::default();
    bindings.set("name", "A");
    bindings.set("show", true);
    assert_eq!(render_with(template, &mut bindings), "Hi A! Yes");

    bindings.set("show", false);
    assert_eq!(render_with(template, &mut bindings), "Hi A! No");
}

#[test]
fn text_without_blocks_renders_unchanged() {
    for text in ["", "plain", "braces { and } alone\r\nwin line\n", "  indented\n\n\ttabs  "] {
        assert_eq!(render(text), text);
    }
}

// ── Whitespace trimming ──

#[test]
fn trim_enter_removes_preceding_space_and_newline() {
    assert_eq!(render("a \n{%- if true %}b{% end %}"), "ab");
}

#[test]
fn trim_exit_removes_following_newline() {
    assert_eq!(render("{% if true -%}\n b{% end %}"), "b");
}

#[test]
fn trimmed_list_keeps_one_line_per_item() {
    let template = "<ul>\n{% foreach x in xs -%}\n  <li>{{ x }}</li>\n{% end -%}\n</ul>";
    let mut bindings = Bindings::default();
    bindings.set("xs", vec!["a", "b"]);
    assert_eq!(
        render_with(template, &mut bindings),
        "<ul>\n<li>a</li>\n<li>b</li>\n</ul>"
    );
}

#[test]
fn output_block_trim() {
    let mut bindings = Bindings::default();
    bindings.set("x", 1i64);
    assert_eq!(render_with("[ \n  {{- x -}}  \n ]", &mut bindings), "[1]");
}

// ── Conditionals ──

#[test]
fn exactly_one_arm_contributes() {
    let template = "{% if n == 1 %}one{% elseif n == 2 %}two{% else %}many{% end %}";
    let without_else = "{% if n == 1 %}one{% elseif n == 2 %}two{% end %}";
    let mut bindings = Bindings::default();
    for (n, expected, fallback) in [(1, "one", "one"), (2, "two", "two"), (3, "many", "")] {
        bindings.set("n", n as i64);
        assert_eq!(render_with(template, &mut bindings), expected);
        assert_eq!(render_with(without_else, &mut bindings), fallback);
    }
}

#[test]
fn first_true_condition_wins() {
    assert_eq!(
        render("{% if 1 < 2 %}a{% elseif true %}b{% end %}"),
        "a"
    );
}

// ── Loops ──

#[test]
fn foreach_with_break_and_continue() {
    let template = "{% foreach x in items %}{% if x == 3 %}{% break %}{% end %}\
                    {% if x == 1 %}{% continue %}{% end %}{{ x }},{% end %}";
    let mut bindings = Bindings::default();
    bindings.set("items", vec![0i64, 1, 2, 3, 4]);
    assert_eq!(render_with(template, &mut bindings), "0,2,");
}

#[test]
fn counted_for_loop() {
    assert_eq!(render("{% for i = 0; i < 3; i++ %}{{ i }}{% end %}"), "012");
    assert_eq!(
        render(
            "{% for i = 0; i < 5; i += 2 %}{% if i == 2 %}{% continue %}{% end %}{{ i }}{% end %}"
        ),
        "04"
    );
}

#[test]
fn for_in_form() {
    assert_eq!(render("{% for s in ['a', 'b'] %}<{{ s }}>{% end %}"), "<a><b>");
}

#[test]
fn missing_iterable_is_empty() {
    assert_eq!(render("[{% foreach x in nothing %}{{ x }}{% end %}]"), "[]");
}

#[test]
fn while_with_update() {
    assert_eq!(
        render("{% var n = 3 %}{% while n > 0 %}{{ n }}{% var n -= 1 %}{% end %}"),
        "321"
    );
}

#[test]
fn runaway_loop_hits_limit() {
    let config = Config {
        loop_limit: 5,
        ..Config::default()
    };
    let template = compile("{% while true %}x{% end %}").unwrap();
    let err = template
        .render_with(&mut Bindings::default(), &Library::new(), &config)
        .unwrap_err();
    assert!(matches!(err, RenderError::LoopLimit { limit: 5 }));
    assert_eq!(err.to_string(), "loop exceeded 5 iterations");
}

#[test]
fn malformed_loop_header() {
    let err = compile("{% foreach items %}{% end %}")
        .unwrap()
        .render(&mut Bindings::default(), &Library::new())
        .unwrap_err();
    assert_eq!(err.to_string(), "malformed foreach header 'items'");
}

// ── Statements ──

#[test]
fn var_declares_for_the_rest_of_the_body() {
    let mut bindings = Bindings::default();
    bindings.set("name", "Ada");
    assert_eq!(
        render_with("{% var greeting = 'hi ' + name %}{{ greeting }}!", &mut bindings),
        "hi Ada!"
    );
}

#[test]
fn return_stops_rendering() {
    assert_eq!(render("a{% return %}b"), "a");
    assert_eq!(render("{% foreach x in [1, 2] %}{{ x }}{% return %}{% end %}tail"), "1");
}

#[test]
fn break_outside_loop_fails() {
    let err = compile("a{% break %}")
        .unwrap()
        .render(&mut Bindings::default(), &Library::new())
        .unwrap_err();
    assert!(matches!(err, RenderError::StrayControl("break")));
    assert_eq!(err.to_string(), "'break' used outside of a loop");
}

#[test]
fn evaluation_errors_name_the_expression() {
    let err = compile("{{ 1 + }}")
        .unwrap()
        .render(&mut Bindings::default(), &Library::new())
        .unwrap_err();
    assert!(err.to_string().starts_with("failed to evaluate '1 +': "));
}

#[test]
fn deeply_nested_expression_fails_cleanly() {
    let depth = 200_000;
    let source = format!("{{{{ {}1{} }}}}", "(".repeat(depth), ")".repeat(depth));
    let err = compile(&source)
        .unwrap()
        .render(&mut Bindings::default(), &Library::new())
        .unwrap_err();
    assert!(matches!(err, RenderError::Eval { .. }));
    assert!(err
        .to_string()
        .ends_with("expression nests deeper than 64 levels"));

    assert_eq!(render("{{ ((((1 + 2)))) * -(-3) }}"), "9");
}

// ── Indentation ──

#[test]
fn indented_render_reindents_text_and_values() {
    let template = compile("a\nb{{ v }}").unwrap();
    let mut bindings = Bindings::default();
    bindings.set("v", "x\ny");
    let out = template
        .render_indented(&mut bindings, &Library::new(), "  ")
        .unwrap();
    assert_eq!(out, "a\n  bx\n  y");

    let plain = template.render(&mut bindings, &Library::new()).unwrap();
    assert_eq!(plain, "a\nbx\ny");
}

// ── Sharing ──

#[test]
fn concurrent_renders_do_not_interfere() {
    let source = "{% foreach x in xs %}{{ x * n }} {% end %}";
    let template = Arc::new(compile_with(source, &Config::default()).unwrap());
    let library = Library::new();
    std::thread::scope(|scope| {
        for n in 1..=4i64 {
            let template = Arc::clone(&template);
            let library = &library;
            scope.spawn(move || {
                let mut bindings = Bindings::default();
                bindings.set("xs", vec![1i64, 2, 3]);
                bindings.set("n", n);
                for _ in 0..50 {
                    let out = template.render(&mut bindings, library).unwrap();
                    assert_eq!(out, format!("{} {} {} ", n, 2 * n, 3 * n));
                }
            });
        }
    });
}

#[test]
fn map_values_render_sorted() {
    let mut bindings = Bindings::default();
    let map: Value = [("b", 2i64), ("a", 1)].into_iter().collect();
    bindings.set("m", map);
    assert_eq!(render_with("{{ m }} {{ m.len }}", &mut bindings), "{a: 1, b: 2} 2");
}
