use server::network::{read_frame, write_frame};
use shared::{ClientPacket, InputState, ServerPacket};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;

// Drives one tank in a slow circle, firing now and then, and prints what
// comes back.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    println!("Connecting to {}", server_addr);
    let stream = TcpStream::connect(&server_addr).await?;
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let welcome = match read_frame::<_, ServerPacket>(&mut reader).await? {
        ServerPacket::Welcome(welcome) => welcome,
        ServerPacket::Disconnected { reason } => {
            println!("Server refused the connection: {}", reason);
            return Ok(());
        }
        other => {
            println!("Expected a welcome but got: {:?}", other);
            return Ok(());
        }
    };
    println!(
        "Joined '{}' as player {} on team {} at tick {}",
        welcome.map_name, welcome.player_id, welcome.team, welcome.tick
    );
    println!(
        "  {} tanks, {} pillboxes, {} bases, {} visible mines",
        welcome.tanks.len(),
        welcome.pillboxes.len(),
        welcome.bases.len(),
        welcome.mines.len()
    );

    // Frames are read on their own task so a partial read is never cancelled
    let (frame_tx, mut frames) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok(packet) = read_frame::<_, ServerPacket>(&mut reader).await {
            if frame_tx.send(packet).is_err() {
                break;
            }
        }
    });

    // Send input ten times a second for ten seconds
    let mut send = interval(Duration::from_millis(100));
    let mut updates = 0u32;
    for sequence in 1..=100u32 {
        send.tick().await;
        let input = InputState {
            sequence,
            accelerate: true,
            turn_left: sequence % 20 < 5,
            shoot: sequence % 25 == 0,
            ..Default::default()
        };
        write_frame(&mut writer, &ClientPacket::Input(input)).await?;

        while let Ok(packet) = frames.try_recv() {
            match packet {
                ServerPacket::Update(update) => {
                    updates += 1;
                    let own = update
                        .tanks
                        .iter()
                        .find(|t| t.player_id == welcome.player_id);
                    if let (Some(tank), true) = (own, updates % 25 == 0) {
                        println!(
                            "Tick {}: pos=({:.0}, {:.0}) dir={} speed={:.2} armor={} shells={}",
                            update.tick,
                            tank.x,
                            tank.y,
                            tank.direction,
                            tank.speed,
                            tank.armor,
                            tank.shells
                        );
                    }
                    for message in &update.hud {
                        println!("  [hud] {}", message.text);
                    }
                }
                ServerPacket::Disconnected { reason } => {
                    println!("Disconnected by server: {}", reason);
                    return Ok(());
                }
                ServerPacket::Welcome(_) => println!("Unexpected second welcome"),
            }
        }
    }

    println!("Received {} updates, sending disconnect", updates);
    write_frame(&mut writer, &ClientPacket::Disconnect).await?;
    Ok(())
}
