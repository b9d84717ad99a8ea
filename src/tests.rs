use rocket::http::{ContentType, Status};
use rocket::local::blocking::{Client, LocalResponse};

const ADMIN_EMAIL: &str = "admin@fitclub.example";

fn create_test_client() -> Client {
    Client::tracked(super::rocket()).unwrap()
}

fn signup<'c>(client: &'c Client, first: &str, last: &str, email: &str, password: &str) -> LocalResponse<'c> {
    client
        .post("/signup")
        .header(ContentType::Form)
        .body(format!(
            "first_name={first}&last_name={last}&email={email}&password={password}&gender=male&payment_method=cash"
        ))
        .dispatch()
}

fn login<'c>(client: &'c Client, email: &str, password: &str) -> LocalResponse<'c> {
    client
        .post("/login")
        .header(ContentType::Form)
        .body(format!("email={email}&password={password}"))
        .dispatch()
}

fn logout(client: &Client) {
    let resp = client.get("/logout").dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
}

fn add_class<'c>(client: &'c Client, code: &str, category: &str, price: i64, slots: i64) -> LocalResponse<'c> {
    client
        .post("/adminclasses")
        .header(ContentType::Form)
        .body(format!(
            "class_code={code}&category={category}&name={category}+basics&instructor=Alex+Morgan&class_time=Mon+18:00&price={price}&slots_available={slots}"
        ))
        .dispatch()
}

fn change_password<'c>(client: &'c Client, old: &str, new1: &str, new2: &str) -> LocalResponse<'c> {
    client
        .post("/changepassword")
        .header(ContentType::Form)
        .body(format!("old_password={old}&new_password1={new1}&new_password2={new2}"))
        .dispatch()
}

// ADMIN_EMAIL is listed under admin_emails in Rocket.toml
fn create_admin(client: &Client) {
    let resp = signup(client, "Ada", "Lovelace", ADMIN_EMAIL, "adminpass");
    assert_eq!(resp.status(), Status::SeeOther);
    let resp = login(client, ADMIN_EMAIL, "adminpass");
    assert_eq!(resp.headers().get_one("Location"), Some("/homepage"));
}

fn page_body(client: &Client, path: &str) -> String {
    let resp = client.get(path).dispatch();
    resp.into_string().unwrap()
}

#[test]
fn public_pages_render() {
    let client = create_test_client();
    for path in ["/", "/contactus1", "/contactus2", "/login", "/signup"] {
        let resp = client.get(path).dispatch();
        assert_eq!(resp.status(), Status::Ok, "GET {path}");
    }
}

#[test]
fn signup_rejects_duplicate_email() {
    let client = create_test_client();
    let resp = signup(&client, "jane", "Doe", "jane@fit.example", "pass123");
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(resp.headers().get_one("Location"), Some("/signup"));
    assert!(page_body(&client, "/signup").contains("Account Created!"));

    let resp = signup(&client, "janet", "Doe", "jane@fit.example", "other456");
    assert_eq!(resp.status(), Status::SeeOther);
    assert!(page_body(&client, "/signup").contains("already exists"));

    // the second signup created no account: its credentials do not log in
    let resp = login(&client, "jane@fit.example", "other456");
    assert_eq!(resp.headers().get_one("Location"), Some("/login"));
    let resp = login(&client, "jane@fit.example", "pass123");
    assert_eq!(resp.headers().get_one("Location"), Some("/homepage"));
}

#[test]
fn session_requires_valid_credentials() {
    let client = create_test_client();
    // no session yet: protected pages show the login view
    assert!(page_body(&client, "/homepage").contains("Please log in first!"));

    let resp = login(&client, "ghost@fit.example", "whatever");
    assert_eq!(resp.headers().get_one("Location"), Some("/login"));

    signup(&client, "jane", "Doe", "jane@fit.example", "pass123");
    let resp = login(&client, "jane@fit.example", "wrongpass");
    assert_eq!(resp.headers().get_one("Location"), Some("/login"));
    assert!(page_body(&client, "/login").contains("Invalid email or password"));

    let resp = login(&client, "jane@fit.example", "pass123");
    assert_eq!(resp.headers().get_one("Location"), Some("/homepage"));
    let body = page_body(&client, "/homepage");
    assert!(body.contains("Welcome, Jane"));
}

#[test]
fn logout_ends_session() {
    let client = create_test_client();
    signup(&client, "jane", "Doe", "jane@fit.example", "pass123");
    login(&client, "jane@fit.example", "pass123");
    let resp = client.get("/homepage").dispatch();
    assert_eq!(resp.status(), Status::Ok);

    logout(&client);
    assert!(page_body(&client, "/homepage").contains("Please log in first!"));
    assert!(page_body(&client, "/").contains("Successfully Logged out!"));
}

#[test]
fn admin_route_requires_admin_session() {
    let client = create_test_client();
    // anonymous: bounced to the login view
    assert!(page_body(&client, "/adminclasses").contains("Please log in first!"));

    signup(&client, "jane", "Doe", "jane@fit.example", "pass123");
    login(&client, "jane@fit.example", "pass123");
    assert!(page_body(&client, "/adminclasses").contains("Administrator access"));
    let resp = add_class(&client, "ROW1", "Rowing", 1500, 2);
    assert!(resp.into_string().unwrap().contains("Administrator access"));
    logout(&client);

    create_admin(&client);
    let resp = client.get("/adminclasses").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let resp = add_class(&client, "ROW1", "Rowing", 1500, 2);
    assert_eq!(resp.status(), Status::SeeOther);
    assert!(page_body(&client, "/adminclasses").contains("Class Successfully Added"));

    // class codes are unique
    let resp = add_class(&client, "ROW1", "Rowing", 900, 5);
    assert_eq!(resp.status(), Status::SeeOther);
    assert!(page_body(&client, "/adminclasses").contains("Class code already exists"));
}

#[test]
fn enlist_decrements_slots_once() {
    let client = create_test_client();
    create_admin(&client);
    let resp = add_class(&client, "ROW1", "Rowing", 1500, 2);
    assert_eq!(resp.status(), Status::SeeOther);
    logout(&client);

    signup(&client, "jane", "Doe", "jane@fit.example", "pass123");
    login(&client, "jane@fit.example", "pass123");

    let resp = client.get("/enlistclass?code=ROW1").dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(resp.headers().get_one("Location"), Some("/homepage"));
    assert!(page_body(&client, "/homepage").contains("Successfully Enlisted!"));
    assert!(page_body(&client, "/rowingclasses").contains(r#"<td class="slots">1</td>"#));

    // repeat enrollment: no extra row, no extra decrement
    let resp = client.get("/enlistclass?code=ROW1").dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
    assert!(page_body(&client, "/homepage").contains("Already Enlisted in this class!"));
    assert!(page_body(&client, "/rowingclasses").contains(r#"<td class="slots">1</td>"#));

    let body = page_body(&client, "/enrolledclasses");
    assert_eq!(body.matches("ROW1").count(), 1);
    assert!(body.contains("Total: 1500"));
}

#[test]
fn enlist_unknown_code_is_a_silent_noop() {
    let client = create_test_client();
    signup(&client, "jane", "Doe", "jane@fit.example", "pass123");
    login(&client, "jane@fit.example", "pass123");

    let resp = client.get("/enlistclass?code=NOPE").dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
    assert_eq!(resp.headers().get_one("Location"), Some("/homepage"));
    assert!(!page_body(&client, "/homepage").contains("Enlisted"));

    let resp = client.get("/enlistclass").dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
    assert!(page_body(&client, "/enrolledclasses").contains("No Classes Enrolled!"));
}

#[test]
fn full_class_rejects_enlistment() {
    let client = create_test_client();
    create_admin(&client);
    let resp = add_class(&client, "STR1", "Strength", 900, 0);
    assert_eq!(resp.status(), Status::SeeOther);
    logout(&client);

    signup(&client, "jane", "Doe", "jane@fit.example", "pass123");
    login(&client, "jane@fit.example", "pass123");
    let resp = client.get("/enlistclass?code=STR1").dispatch();
    assert_eq!(resp.status(), Status::SeeOther);
    assert!(page_body(&client, "/homepage").contains("No slots left in this class!"));
    assert!(page_body(&client, "/enrolledclasses").contains("No Classes Enrolled!"));
    assert!(page_body(&client, "/strengthclasses").contains(r#"<td class="slots">0</td>"#));
}

#[test]
fn enrollment_summary_totals_prices() {
    let client = create_test_client();
    create_admin(&client);
    add_class(&client, "ROW1", "Rowing", 1500, 5);
    add_class(&client, "CYC1", "Cycling", 1200, 5);
    logout(&client);

    signup(&client, "jane", "Doe", "jane@fit.example", "pass123");
    login(&client, "jane@fit.example", "pass123");
    assert!(page_body(&client, "/enrolledclasses").contains("No Classes Enrolled!"));

    client.get("/enlistclass?code=ROW1").dispatch();
    client.get("/enlistclass?code=CYC1").dispatch();
    let body = page_body(&client, "/enrolledclasses");
    assert!(body.contains("ROW1"));
    assert!(body.contains("CYC1"));
    assert!(body.contains("Total: 2700"));
}

#[test]
fn category_listings_are_isolated() {
    let client = create_test_client();
    create_admin(&client);
    add_class(&client, "ROW1", "Rowing", 1500, 5);
    add_class(&client, "CYC1", "Cycling", 1200, 5);

    let body = page_body(&client, "/rowingclasses");
    assert!(body.contains("ROW1"));
    assert!(!body.contains("CYC1"));
    let body = page_body(&client, "/cyclingclasses");
    assert!(body.contains("CYC1"));
    assert!(!body.contains("ROW1"));
    assert!(page_body(&client, "/enduranceclasses").contains("No Endurance classes"));
}

#[test]
fn change_password_flow() {
    let client = create_test_client();
    signup(&client, "jane", "Doe", "jane@fit.example", "pass123");
    login(&client, "jane@fit.example", "pass123");

    let resp = change_password(&client, "wrongold", "newpass1", "newpass1");
    assert_eq!(resp.status(), Status::SeeOther);
    assert!(page_body(&client, "/changepassword").contains("Incorrect Password"));

    let resp = change_password(&client, "pass123", "newpass1", "newpass2");
    assert_eq!(resp.status(), Status::SeeOther);
    assert!(page_body(&client, "/changepassword").contains("Passwords do not match"));

    // neither failed attempt touched the stored credential
    logout(&client);
    let resp = login(&client, "jane@fit.example", "pass123");
    assert_eq!(resp.headers().get_one("Location"), Some("/homepage"));

    let resp = change_password(&client, "pass123", "newpass9", "newpass9");
    assert_eq!(resp.status(), Status::SeeOther);
    assert!(page_body(&client, "/changepassword").contains("Password successfully updated!"));

    logout(&client);
    let resp = login(&client, "jane@fit.example", "pass123");
    assert_eq!(resp.headers().get_one("Location"), Some("/login"));
    let resp = login(&client, "jane@fit.example", "newpass9");
    assert_eq!(resp.headers().get_one("Location"), Some("/homepage"));
}

#[test]
fn myaccount_shows_details_but_never_credentials() {
    let client = create_test_client();
    signup(&client, "jane", "Doe", "jane@fit.example", "pass123");
    login(&client, "jane@fit.example", "pass123");
    let body = page_body(&client, "/myaccount");
    assert!(body.contains("jane@fit.example"));
    assert!(body.contains("cash"));
    assert!(!body.contains("pass123"));
    assert!(!body.contains("argon2"));
}

#[test]
fn invalid_forms_are_rejected_before_any_write() {
    let client = create_test_client();
    // broken email syntax: form re-rendered, nothing persisted
    let resp = signup(&client, "jane", "Doe", "not-an-email", "pass123");
    assert_eq!(resp.status(), Status::Ok);
    // first name too short
    let resp = signup(&client, "jo", "Doe", "jo@fit.example", "pass123");
    assert_eq!(resp.status(), Status::Ok);
    let resp = login(&client, "jo@fit.example", "pass123");
    assert_eq!(resp.headers().get_one("Location"), Some("/login"));
}

#[test]
fn session_expiry_window() {
    let session = crate::AccountSession {
        account_id: 1,
        email: "jane@fit.example".to_string(),
        first_name: "jane".to_string(),
        is_admin: false,
        created: chrono::Utc::now() - chrono::Duration::minutes(121),
    };
    assert!(session.expired(120));
    // 0 disables expiry
    assert!(!session.expired(0));
    let fresh = crate::AccountSession { created: chrono::Utc::now(), ..session };
    assert!(!fresh.expired(120));
}
