use crate::{Context, Error};
use poise::serenity_prelude::{self as serenity, ChannelId, ChannelType};

/// Set the Minecraft server address to monitor
#[poise::command(
    slash_command,
    guild_only,
    ephemeral,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn setip(
    ctx: Context<'_>,
    #[description = "Server address, host or host:port"] address: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().unwrap().get();

    ctx.data()
        .dbs
        .status
        .set_address(guild_id, address.clone())
        .await?;

    ctx.say(format!("✅ Server address set: `{}`", address))
        .await?;
    Ok(())
}

/// Choose the channel where the status message is published
#[poise::command(
    slash_command,
    guild_only,
    ephemeral,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn setchannel(
    ctx: Context<'_>,
    #[description = "Text channel for the status message"] channel: ChannelId,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().unwrap().get();

    let channel_info = channel.to_channel(&ctx.serenity_context()).await?;
    if !matches!(channel_info.guild(), Some(c) if c.kind == ChannelType::Text) {
        ctx.say("❌ Please select a text channel!").await?;
        return Ok(());
    }

    // a new channel needs a fresh message; the setter drops the old id
    ctx.data()
        .dbs
        .status
        .set_channel(guild_id, channel.get())
        .await?;

    ctx.say(format!("✅ Status channel set: <#{}>", channel.get()))
        .await?;
    Ok(())
}

/// Show the configuration commands and an invite link
#[poise::command(slash_command, ephemeral)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let app_id = ctx.serenity_context().cache.current_user().id.get();
    let invite_url = format!(
        "https://discord.com/api/oauth2/authorize?client_id={}&permissions=2147518480&scope=bot%20applications.commands",
        app_id
    );

    let embed = serenity::CreateEmbed::new()
        .title("📘 Minecraft Status Bot")
        .description(
            "Monitors a Minecraft server and keeps an auto-updating status \
             message in a channel of your choice.",
        )
        .colour(serenity::Colour::BLUE)
        .field(
            "⚙️ Configuration (admin only)",
            "`/setip <address>`: set the server address (e.g. play.example.com)\n\
             `/setchannel <channel>`: choose where the status message is posted",
            false,
        )
        .field(
            "🔗 Invite",
            format!("[Add the bot to your server]({})", invite_url),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
