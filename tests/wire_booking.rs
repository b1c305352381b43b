use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_postgres::{AsyncMessage, Config, NoTls, Notification, SimpleQueryMessage};
use ulid::Ulid;

use agentcal::clock::SystemClock;
use agentcal::engine::{Engine, OverlapRule};
use agentcal::notify::NotifyHub;
use agentcal::wire::{self, ServerContext};

const PASSWORD: &str = "agentcal";
const ADMIN: &str = "agentcal";
// A Monday far enough ahead that no slot is in the past.
const MONDAY: &str = "2030-01-07";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("agentcal_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let hub = Arc::new(NotifyHub::new(64));
    let engine = Arc::new(
        Engine::new(
            dir.join("agentcal.wal"),
            hub.clone(),
            Arc::new(SystemClock),
            OverlapRule::Interval,
        )
        .unwrap(),
    );
    let ctx = Arc::new(ServerContext {
        engine,
        hub,
        password: PASSWORD.to_string(),
        service_user: ADMIN.to_string(),
    });

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, ctx, None).await;
            });
        }
    });

    addr
}

async fn connect(
    addr: SocketAddr,
    user: &str,
) -> (
    tokio_postgres::Client,
    mpsc::UnboundedReceiver<Notification>,
) {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("agentcal")
        .user(user)
        .password(PASSWORD);

    let (client, mut connection) = config.connect(NoTls).await.unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let stream = stream::poll_fn(move |cx| connection.poll_message(cx));
        futures::pin_mut!(stream);
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(AsyncMessage::Notification(n)) => {
                    let _ = tx.send(n);
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    (client, rx)
}

async fn recv_notification(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
    timeout: Duration,
) -> Option<Notification> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
}

fn rows(messages: Vec<SimpleQueryMessage>) -> Vec<tokio_postgres::SimpleQueryRow> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

fn sqlstate(err: &tokio_postgres::Error) -> Option<&str> {
    err.code().map(|c| c.code())
}

/// Admin creates an agent working Mondays 09:00-17:00.
async fn seed_agent(admin: &tokio_postgres::Client) -> Ulid {
    let agent = Ulid::new();
    admin
        .batch_execute(&format!(
            "INSERT INTO agents (id, name, default_duration) VALUES ('{agent}', 'Ana', 30)"
        ))
        .await
        .unwrap();
    admin
        .batch_execute(&format!(
            "INSERT INTO weekly_hours (agent_id, day, start_time, end_time) VALUES \
             ('{agent}', 1, '09:00', '17:00')"
        ))
        .await
        .unwrap();
    agent
}

fn booking_sql(id: Ulid, agent: Ulid, client: Ulid, start: &str, end: &str) -> String {
    format!(
        "INSERT INTO bookings (id, agent_id, client_id, date, start_time, end_time, total_amount) \
         VALUES ('{id}', '{agent}', '{client}', '{MONDAY}', '{start}', '{end}', 20000)"
    )
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn admin_sets_up_agent_and_reads_slots() {
    let addr = start_test_server().await;
    let (admin, _rx) = connect(addr, ADMIN).await;
    let agent = seed_agent(&admin).await;

    let slots = rows(
        admin
            .simple_query(&format!(
                "SELECT * FROM slots WHERE agent_id = '{agent}' AND date = '{MONDAY}'"
            ))
            .await
            .unwrap(),
    );
    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0].get("time"), Some("09:00"));
    assert_eq!(slots[0].get("available"), Some("t"));
    assert_eq!(slots[15].get("time"), Some("16:30"));

    let week = rows(
        admin
            .simple_query(&format!("SELECT * FROM weekly_hours WHERE agent_id = '{agent}'"))
            .await
            .unwrap(),
    );
    assert_eq!(week.len(), 7);
    assert_eq!(week[1].get("slots"), Some("09:00-17:00"));
    assert_eq!(week[0].get("unavailable"), Some("t"));
}

#[tokio::test]
async fn client_books_and_conflict_is_reported() {
    let addr = start_test_server().await;
    let (admin, _rx) = connect(addr, ADMIN).await;
    let agent = seed_agent(&admin).await;

    let client_a = Ulid::new();
    let (as_a, _rx_a) = connect(addr, &format!("client_{client_a}")).await;
    let first = Ulid::new();
    as_a.batch_execute(&booking_sql(first, agent, client_a, "10:00", "11:00"))
        .await
        .unwrap();

    let client_b = Ulid::new();
    let (as_b, _rx_b) = connect(addr, &format!("client_{client_b}")).await;
    let err = as_b
        .batch_execute(&booking_sql(Ulid::new(), agent, client_b, "10:30", "11:30"))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("23P01"));

    // Back-to-back is fine.
    as_b.batch_execute(&booking_sql(Ulid::new(), agent, client_b, "11:00", "11:30"))
        .await
        .unwrap();

    // Booking on someone else's behalf is refused.
    let err = as_b
        .batch_execute(&booking_sql(Ulid::new(), agent, client_a, "14:00", "15:00"))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("42501"));

    let booked = rows(
        admin
            .simple_query(&format!("SELECT * FROM bookings WHERE id = '{first}'"))
            .await
            .unwrap(),
    );
    assert_eq!(booked.len(), 1);
    assert_eq!(booked[0].get("status"), Some("PENDING"));
    assert_eq!(booked[0].get("commission"), Some("2000"));
    assert_eq!(booked[0].get("service_id"), None);
}

#[tokio::test]
async fn day_off_and_unknown_agent_errors() {
    let addr = start_test_server().await;
    let (admin, _rx) = connect(addr, ADMIN).await;
    let agent = seed_agent(&admin).await;

    // 2030-01-08 is a Tuesday.
    let err = admin
        .batch_execute(&format!(
            "INSERT INTO bookings (id, agent_id, client_id, date, start_time, end_time) \
             VALUES ('{}', '{agent}', '{}', '2030-01-08', '10:00', '10:30')",
            Ulid::new(),
            Ulid::new()
        ))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("55000"));

    let tuesday = rows(
        admin
            .simple_query(&format!(
                "SELECT * FROM slots WHERE agent_id = '{agent}' AND date = '2030-01-08'"
            ))
            .await
            .unwrap(),
    );
    assert!(tuesday.is_empty());

    let err = admin
        .simple_query(&format!(
            "SELECT * FROM slots WHERE agent_id = '{}' AND date = '{MONDAY}'",
            Ulid::new()
        ))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("P0002"));
}

#[tokio::test]
async fn anonymous_login_is_read_only() {
    let addr = start_test_server().await;
    let (admin, _rx) = connect(addr, ADMIN).await;
    seed_agent(&admin).await;

    let (stranger, _rx) = connect(addr, "postgres").await;
    let agents = rows(stranger.simple_query("SELECT * FROM agents").await.unwrap());
    assert_eq!(agents.len(), 1);

    let err = stranger
        .batch_execute(&format!("INSERT INTO agents (id) VALUES ('{}')", Ulid::new()))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("42501"));
}

#[tokio::test]
async fn agent_manages_own_bookings() {
    let addr = start_test_server().await;
    let (admin, _rx) = connect(addr, ADMIN).await;
    let agent = seed_agent(&admin).await;

    let booking = Ulid::new();
    admin
        .batch_execute(&booking_sql(booking, agent, Ulid::new(), "09:00", "09:30"))
        .await
        .unwrap();

    let (as_agent, _rx) = connect(addr, &format!("agent_{agent}")).await;
    as_agent
        .batch_execute(&format!(
            "UPDATE bookings SET status = 'CONFIRMED' WHERE id = '{booking}'"
        ))
        .await
        .unwrap();
    as_agent
        .batch_execute(&format!("UPDATE bookings SET seen_by_agent = true WHERE id = '{booking}'"))
        .await
        .unwrap();

    let err = as_agent
        .batch_execute(&format!("UPDATE bookings SET status = 'PENDING' WHERE id = '{booking}'"))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("22023"));

    let other = seed_agent(&admin).await;
    let err = as_agent
        .batch_execute(&format!("DELETE FROM weekly_hours WHERE agent_id = '{other}'"))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("42501"));

    let confirmed = rows(
        as_agent
            .simple_query(&format!("SELECT * FROM bookings WHERE agent_id = '{agent}'"))
            .await
            .unwrap(),
    );
    assert_eq!(confirmed[0].get("status"), Some("CONFIRMED"));
    assert_eq!(confirmed[0].get("seen_by_agent"), Some("t"));
}

#[tokio::test]
async fn listening_agent_hears_new_booking() {
    let addr = start_test_server().await;
    let (admin, _rx) = connect(addr, ADMIN).await;
    let agent = seed_agent(&admin).await;

    let (as_agent, mut notices) = connect(addr, &format!("agent_{agent}")).await;
    as_agent
        .batch_execute(&format!("LISTEN agent_{agent}"))
        .await
        .unwrap();

    let client = Ulid::new();
    let (as_client, _rx) = connect(addr, &format!("client_{client}")).await;
    let booking = Ulid::new();
    as_client
        .batch_execute(&booking_sql(booking, agent, client, "13:00", "13:30"))
        .await
        .unwrap();

    // Delivered at the listener's next statement.
    as_agent.simple_query("SELECT * FROM agents").await.unwrap();
    let notif = recv_notification(&mut notices, Duration::from_secs(5))
        .await
        .expect("expected notification");
    assert_eq!(notif.channel(), format!("agent_{agent}"));

    let payload: serde_json::Value = serde_json::from_str(notif.payload()).unwrap();
    assert_eq!(payload["type"], "new_booking");
    assert_eq!(payload["booking_id"], booking.to_string());
    assert_eq!(payload["start"], "13:00");
}

#[tokio::test]
async fn listen_requires_ownership_and_unlisten_stops_delivery() {
    let addr = start_test_server().await;
    let (admin, _rx) = connect(addr, ADMIN).await;
    let agent = seed_agent(&admin).await;

    let (as_client, _rx) = connect(addr, &format!("client_{}", Ulid::new())).await;
    let err = as_client
        .batch_execute(&format!("LISTEN agent_{agent}"))
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("42501"));

    let err = admin.batch_execute("LISTEN bookings").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("22023"));

    let (listener, mut notices) = connect(addr, ADMIN).await;
    listener
        .batch_execute(&format!("LISTEN agent_{agent}"))
        .await
        .unwrap();
    listener.batch_execute("UNLISTEN *").await.unwrap();

    admin
        .batch_execute(&booking_sql(Ulid::new(), agent, Ulid::new(), "15:00", "15:30"))
        .await
        .unwrap();
    listener.simple_query("SELECT * FROM agents").await.unwrap();
    assert!(
        recv_notification(&mut notices, Duration::from_millis(300))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn extended_protocol_with_parameters() {
    let addr = start_test_server().await;
    let (admin, _rx) = connect(addr, ADMIN).await;
    let agent = seed_agent(&admin).await;

    let agent_str = agent.to_string();
    let booking = Ulid::new().to_string();
    let client = Ulid::new().to_string();
    admin
        .execute(
            "INSERT INTO bookings (id, agent_id, client_id, date, start_time, end_time) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[&booking, &agent_str, &client, &MONDAY, &"16:00", &"16:30"],
        )
        .await
        .unwrap();

    let found = admin
        .query(
            "SELECT * FROM bookings WHERE agent_id = $1 AND date = $2",
            &[&agent_str, &MONDAY],
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get::<_, String>("id"), booking);
    assert_eq!(found[0].get::<_, String>("start_time"), "16:00");
    assert!(!found[0].get::<_, bool>("seen_by_agent"));

    let slots = admin
        .query(
            "SELECT * FROM slots WHERE agent_id = $1 AND date = $2",
            &[&agent_str, &MONDAY],
        )
        .await
        .unwrap();
    let last = slots.last().unwrap();
    assert_eq!(last.get::<_, String>("time"), "16:30");
    assert!(!slots[14].get::<_, bool>("available"));
}
